//! CLI command implementations

pub mod cache;
pub mod config;
pub mod copy;
pub mod init;

pub use cache::execute as cache;
pub use config::execute as config;
pub use copy::execute as copy;
pub use init::execute as init;

use crate::cache::Recipe;
use crate::cli::args::RecipeArgs;
use crate::error::PgstampResult;

/// Assemble a recipe from command-line flags
pub(crate) fn recipe_from_args(args: &RecipeArgs) -> PgstampResult<Recipe> {
    args.recipe_files
        .iter()
        .try_fold(Recipe::new(&args.modules).with_demo(args.demo), |recipe, path| {
            recipe.with_file(path)
        })
}
