//! Hand-authored production data: launcher templates and upgrade books.
//!
//! This module performs no IO; callers read the RON text themselves.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{ProductionError, Result};
use crate::launcher::LauncherTemplate;
use crate::tasks::TypeCode;
use crate::upgrades::{UpgradeBook, UpgradeDefinition};

/// Launcher templates and upgrades for one ruleset.
///
/// # Example RON
///
/// ```ron
/// ProductionData(
///     launchers: [
///         LauncherTemplate(code: "barracks", tasks: [...]),
///     ],
///     upgrades: [
///         Unit(UnitUpgrade(
///             id: "pikes",
///             source: "spearman",
///             target: "pikeman",
///             replacement: (description: "Train pikeman", reload_time: 6.0),
///         )),
///     ],
/// )
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionData {
    /// Launcher templates keyed by holder type.
    #[serde(default)]
    pub launchers: Vec<LauncherTemplate>,
    /// Upgrade definitions.
    #[serde(default)]
    pub upgrades: Vec<UpgradeDefinition>,
}

impl ProductionData {
    /// Parse from RON text.
    ///
    /// # Errors
    ///
    /// Returns [`ProductionError::DataParseError`] for malformed RON or for
    /// data that fails [`validate`](Self::validate).
    pub fn from_ron_str(text: &str) -> Result<Self> {
        let data: Self =
            ron::from_str(text).map_err(|e| ProductionError::DataParseError(e.to_string()))?;
        let errors = data.validate();
        if errors.is_empty() {
            Ok(data)
        } else {
            Err(ProductionError::DataParseError(errors.join("; ")))
        }
    }

    /// Template for a holder type.
    #[must_use]
    pub fn template(&self, holder: &TypeCode) -> Option<&LauncherTemplate> {
        self.launchers
            .iter()
            .find(|template| template.code == holder.as_str())
    }

    /// Build an upgrade book from the definitions.
    #[must_use]
    pub fn upgrade_book(&self) -> UpgradeBook {
        let mut book = UpgradeBook::new();
        for upgrade in &self.upgrades {
            book.insert(upgrade.clone());
        }
        book
    }

    /// Check internal consistency.
    ///
    /// Returns a list of problems; empty means valid.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let book = self.upgrade_book();

        let mut upgrade_ids = BTreeSet::new();
        for upgrade in &self.upgrades {
            if !upgrade_ids.insert(upgrade.id()) {
                errors.push(format!("Upgrade '{}' is defined twice", upgrade.id()));
            }
        }
        if let Err(err) = book.validate() {
            errors.push(err.to_string());
        }

        let mut holders = BTreeSet::new();
        for template in &self.launchers {
            if !holders.insert(template.code.as_str()) {
                errors.push(format!("Launcher template '{}' is defined twice", template.code));
            }

            let mut codes = BTreeSet::new();
            for task in &template.tasks {
                if !codes.insert(&task.code) {
                    errors.push(format!(
                        "Launcher '{}' offers task '{}' twice",
                        template.code, task.code
                    ));
                }
                if let Err(err) = task.validate() {
                    errors.push(format!("Launcher '{}': {err}", template.code));
                }
                if let Some(id) = task.upgrade() {
                    match book.get(id) {
                        None => errors.push(format!(
                            "Task '{}' references unknown upgrade '{id}'",
                            task.code
                        )),
                        Some(upgrade) if upgrade.kind().task_kind() != task.kind => {
                            errors.push(format!(
                                "Task '{}' is {:?} but upgrade '{id}' is a {:?} upgrade",
                                task.code,
                                task.kind,
                                upgrade.kind()
                            ));
                        }
                        Some(_) => {}
                    }
                }
            }
        }

        errors
    }
}
