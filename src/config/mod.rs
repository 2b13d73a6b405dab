#[cfg(feature = "cli")]
pub mod cli;
pub mod toml_config;

pub use toml_config::SelectorConfig;

#[cfg(feature = "cli")]
use crate::domain::model::SelectionType;
#[cfg(feature = "cli")]
use clap::{Parser, ValueEnum};

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliSelectionType {
    All,
    ModelDefinitionOnly,
}

#[cfg(feature = "cli")]
impl From<CliSelectionType> for SelectionType {
    fn from(value: CliSelectionType) -> Self {
        match value {
            CliSelectionType::All => SelectionType::All,
            CliSelectionType::ModelDefinitionOnly => SelectionType::ModelDefinitionOnly,
        }
    }
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "modelpack-selector")]
#[command(about = "Browse model packages and pick a model definition")]
pub struct CliConfig {
    /// Catalog of repositories and packages (TOML)
    #[arg(long)]
    pub catalog: String,

    /// Selector settings (TOML)
    #[arg(short, long)]
    pub config: Option<String>,

    #[arg(long)]
    pub package: Option<String>,

    #[arg(long, requires = "package")]
    pub variant: Option<String>,

    /// Model definition to pick instead of the first one
    #[arg(long)]
    pub definition: Option<String>,

    #[arg(long)]
    pub sequence: Option<String>,

    #[arg(long)]
    pub optics: Option<String>,

    #[arg(long)]
    pub range: Option<String>,

    #[arg(long, value_enum)]
    pub selection_type: Option<CliSelectionType>,

    #[arg(long)]
    pub show_tags: bool,

    #[arg(long)]
    pub show_branches: bool,

    #[arg(long)]
    pub hide_releases: bool,

    #[arg(long)]
    pub offline: bool,

    /// Disable a repository before browsing (repeatable)
    #[arg(long = "disable-repository")]
    pub disabled_repositories: Vec<String>,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,
}
