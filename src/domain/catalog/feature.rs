//! Feature flags gated by tier.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{CatalogError, Tier};

/// A product capability that can be locked or unlocked per clinic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Feature {
    PatientRecords,
    AppointmentScheduling,
    DocumentCapture,
    Invoicing,
    Prescriptions,
    SmsReminders,
    WhatsappReminders,
    OnlineBooking,
    InventoryManagement,
    ReportsDashboard,
    MultiDoctor,
    FhirExport,
    DrugInteractionCheck,
    CustomBranding,
    ApiAccess,
    MultiBranch,
    SsoIntegration,
    AuditTrailExport,
    AiPrescriptionAssistant,
    AiClinicalNotes,
    AiOcrIngestion,
    PredictiveAnalytics,
}

impl Feature {
    pub const COUNT: usize = 22;

    /// Every feature, in declaration order.
    pub const ALL: [Feature; Feature::COUNT] = [
        Feature::PatientRecords,
        Feature::AppointmentScheduling,
        Feature::DocumentCapture,
        Feature::Invoicing,
        Feature::Prescriptions,
        Feature::SmsReminders,
        Feature::WhatsappReminders,
        Feature::OnlineBooking,
        Feature::InventoryManagement,
        Feature::ReportsDashboard,
        Feature::MultiDoctor,
        Feature::FhirExport,
        Feature::DrugInteractionCheck,
        Feature::CustomBranding,
        Feature::ApiAccess,
        Feature::MultiBranch,
        Feature::SsoIntegration,
        Feature::AuditTrailExport,
        Feature::AiPrescriptionAssistant,
        Feature::AiClinicalNotes,
        Feature::AiOcrIngestion,
        Feature::PredictiveAnalytics,
    ];

    /// Built-in minimum tier for each feature.
    ///
    /// Exhaustive on purpose: a new variant does not compile until it is
    /// placed on a tier.
    pub fn default_required_tier(&self) -> Tier {
        match self {
            Feature::PatientRecords | Feature::AppointmentScheduling | Feature::DocumentCapture => {
                Tier::Capture
            }
            Feature::Invoicing | Feature::Prescriptions | Feature::SmsReminders => Tier::Core,
            Feature::WhatsappReminders
            | Feature::OnlineBooking
            | Feature::InventoryManagement
            | Feature::ReportsDashboard => Tier::Plus,
            Feature::MultiDoctor
            | Feature::FhirExport
            | Feature::DrugInteractionCheck
            | Feature::CustomBranding
            | Feature::ApiAccess => Tier::Pro,
            Feature::MultiBranch | Feature::SsoIntegration | Feature::AuditTrailExport => {
                Tier::Enterprise
            }
            Feature::AiPrescriptionAssistant
            | Feature::AiClinicalNotes
            | Feature::AiOcrIngestion
            | Feature::PredictiveAnalytics => Tier::Intelligence,
        }
    }

    /// Wire identifier, e.g. `"MULTI_DOCTOR"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::PatientRecords => "PATIENT_RECORDS",
            Feature::AppointmentScheduling => "APPOINTMENT_SCHEDULING",
            Feature::DocumentCapture => "DOCUMENT_CAPTURE",
            Feature::Invoicing => "INVOICING",
            Feature::Prescriptions => "PRESCRIPTIONS",
            Feature::SmsReminders => "SMS_REMINDERS",
            Feature::WhatsappReminders => "WHATSAPP_REMINDERS",
            Feature::OnlineBooking => "ONLINE_BOOKING",
            Feature::InventoryManagement => "INVENTORY_MANAGEMENT",
            Feature::ReportsDashboard => "REPORTS_DASHBOARD",
            Feature::MultiDoctor => "MULTI_DOCTOR",
            Feature::FhirExport => "FHIR_EXPORT",
            Feature::DrugInteractionCheck => "DRUG_INTERACTION_CHECK",
            Feature::CustomBranding => "CUSTOM_BRANDING",
            Feature::ApiAccess => "API_ACCESS",
            Feature::MultiBranch => "MULTI_BRANCH",
            Feature::SsoIntegration => "SSO_INTEGRATION",
            Feature::AuditTrailExport => "AUDIT_TRAIL_EXPORT",
            Feature::AiPrescriptionAssistant => "AI_PRESCRIPTION_ASSISTANT",
            Feature::AiClinicalNotes => "AI_CLINICAL_NOTES",
            Feature::AiOcrIngestion => "AI_OCR_INGESTION",
            Feature::PredictiveAnalytics => "PREDICTIVE_ANALYTICS",
        }
    }

    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Feature {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('-', "_");
        Feature::ALL
            .into_iter()
            .find(|feature| feature.as_str().eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| CatalogError::UnknownFeature(s.to_string()))
    }
}
