use std::path::Path;

use mlua::prelude::*;
use mlua::{LuaOptions, StdLib};
use tracing::{debug, info};

use crate::platform::Platform;
use crate::recipe::{LoadedRecipe, Recipe, RecipeError};

/// Create the Lua runtime recipes are evaluated in.
///
/// Only the `table`, `string`, `math` and `utf8` libraries are loaded, and the
/// base library's file loaders are removed, so a recipe has no way to read
/// files, the process environment or `/proc`. A `stage` global exposes
/// `stage.dir`, `stage.platform`, `stage.os` and `stage.arch`.
fn create_runtime(recipe_dir: &Path) -> LuaResult<Lua> {
  let lua = Lua::new_with(
    StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::UTF8,
    LuaOptions::default(),
  )?;
  let globals = lua.globals();

  for name in ["dofile", "loadfile", "require"] {
    globals.set(name, LuaNil)?;
  }

  let platform = Platform::current();
  let stage = lua.create_table()?;
  stage.set("dir", recipe_dir.to_string_lossy().to_string())?;
  stage.set("platform", platform.triple())?;
  stage.set("os", platform.os.clone())?;
  stage.set("arch", platform.arch.clone())?;
  globals.set("stage", stage)?;

  Ok(lua)
}

/// Evaluate a recipe file and validate the result.
pub fn load_recipe(path: &Path) -> Result<LoadedRecipe, RecipeError> {
  if !path.exists() {
    return Err(RecipeError::NotFound(path.to_path_buf()));
  }

  let canonical = dunce::canonicalize(path).map_err(|e| RecipeError::Read {
    path: path.to_path_buf(),
    message: e.to_string(),
  })?;
  let content = std::fs::read_to_string(&canonical).map_err(|e| RecipeError::Read {
    path: canonical.clone(),
    message: e.to_string(),
  })?;
  let dir = canonical.parent().unwrap_or(Path::new(".")).to_path_buf();

  debug!(path = %canonical.display(), "evaluating recipe");

  let recipe = {
    let lua = create_runtime(&dir)?;
    let value = lua
      .load(&content)
      .set_name(format!("@{}", canonical.display()))
      .eval::<LuaValue>()?;

    if !value.is_table() {
      return Err(RecipeError::Lua {
        message: "recipe must return a table".to_string(),
      });
    }

    lua.from_value::<Recipe>(value)?
  };

  recipe.validate()?;

  info!(name = %recipe.name, path = %canonical.display(), "recipe loaded");

  Ok(LoadedRecipe {
    recipe,
    dir,
    path: canonical,
  })
}
