pub mod schema;
pub mod loader;

pub use schema::{
    Config, GenerationOptions, InputConfig, OptionalStyle, SecurityOptions, ServerOptions,
    SplitOptions, SplitStrategy,
};
pub use loader::{load_config, merge_with_cli_args, CliOverrides};
