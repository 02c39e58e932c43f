use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{LicenseTierId, StandardId, TemplateId};

/// Resource entitlements of a license tier.
///
/// Numeric quotas: `None` is unlimited, `Some(0)` means the tier has no
/// entitlement to the resource at all. Catalogs: `None` entitles the whole
/// catalog, `Some(set)` (even an empty one) only the listed items.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LicenseRule {
    pub license_tier_id: LicenseTierId,
    #[serde(default)]
    pub max_applications: Option<u32>,
    /// Assessments per application
    #[serde(default)]
    pub max_assessments: Option<u32>,
    #[serde(default)]
    pub max_standards_per_application: Option<u32>,
    #[serde(default)]
    pub available_standard_ids: Option<BTreeSet<StandardId>>,
    #[serde(default)]
    pub available_template_ids: Option<BTreeSet<TemplateId>>,
}

impl LicenseRule {
    pub fn unlimited(license_tier_id: LicenseTierId) -> Self {
        Self {
            license_tier_id,
            ..Default::default()
        }
    }

    pub fn standard_available(&self, standard: StandardId) -> bool {
        self.available_standard_ids
            .as_ref()
            .is_none_or(|set| set.contains(&standard))
    }

    pub fn template_available(&self, template: TemplateId) -> bool {
        self.available_template_ids
            .as_ref()
            .is_none_or(|set| set.contains(&template))
    }
}
