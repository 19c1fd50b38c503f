use stagehand_lib::platform::Platform;
use stagehand_lib::platform::paths::store_dir;

pub fn cmd_info() {
  println!("stagehand {}", env!("CARGO_PKG_VERSION"));
  println!("Platform: {}", Platform::current().triple());
  println!("Store: {}", store_dir().display());
}
