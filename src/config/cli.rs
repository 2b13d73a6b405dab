use crate::config::{CliConfig, SelectorConfig};
use crate::domain::model::{Mode, VariantKind};
use crate::utils::error::Result;
use crate::utils::validation::{validate_non_empty_string, validate_required_field, Validate};

impl CliConfig {
    /// Loads the settings file (or defaults) and applies the command-line
    /// overrides on top.
    pub fn resolve(&self) -> Result<SelectorConfig> {
        let mut config = match &self.config {
            Some(path) => {
                tracing::info!("📁 Loading selector configuration from: {}", path);
                SelectorConfig::from_file(path)?
            }
            None => SelectorConfig::default(),
        };

        if self.show_tags {
            config.filter = config.filter.with_shown(VariantKind::Tag, true);
        }
        if self.show_branches {
            config.filter = config.filter.with_shown(VariantKind::Branch, true);
        }
        if self.hide_releases {
            config.filter = config.filter.with_shown(VariantKind::Release, false);
        }
        if self.offline {
            config.selection.mode = Some(Mode::Offline);
        }
        if let Some(selection_type) = self.selection_type {
            config.selection.selection_type = selection_type.into();
        }

        config.validate()?;
        Ok(config)
    }
}

impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validate_non_empty_string("catalog", &self.catalog)?;

        let picks_below_package = self.definition.is_some()
            || self.sequence.is_some()
            || self.optics.is_some()
            || self.range.is_some();
        if picks_below_package {
            validate_required_field("package", &self.package)?;
        }

        for (field, value) in [
            ("package", &self.package),
            ("variant", &self.variant),
            ("definition", &self.definition),
        ] {
            if let Some(value) = value {
                validate_non_empty_string(field, value)?;
            }
        }
        Ok(())
    }
}
