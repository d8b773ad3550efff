//! Declarative approval rules
//!
//! Who signs what, who may perform each role-gated transition, and who is
//! told about each workflow event. Loaded from JSON; the built-in defaults
//! mirror the approver roster the service shipped with.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::EntityKind;
use crate::notify::NotificationEvent;

pub const DIRECTOR: Uuid = Uuid::from_u128(1);
pub const DEPUTY_DIRECTOR: Uuid = Uuid::from_u128(2);
pub const PROCUREMENT_HEAD: Uuid = Uuid::from_u128(3);
pub const CHIEF_ACCOUNTANT: Uuid = Uuid::from_u128(4);
pub const LAWYER: Uuid = Uuid::from_u128(5);

/// Upper bound for the delivery follow-up delay, ten years
pub const MAX_FOLLOWUP_DAYS: i64 = 3650;

#[derive(Error, Debug)]
pub enum RulesError {
    #[error("Failed to read rules file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse rules file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid rules: {0}")]
    Invalid(String),
}

/// The approval rule table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRules {
    /// Everyone who must sign a request before it moves on
    pub request_signers: Vec<Uuid>,
    /// Everyone who must sign a protocol before it can be numbered
    pub protocol_signers: Vec<Uuid>,
    /// Signs every tender protocol automatically when a winner is selected
    pub protocol_auto_signer: Uuid,
    /// May edit or delete any supplier offer, not only their own
    pub supplier_admins: Vec<Uuid>,
    /// May select winners, cancel tenders, number protocols and submit to finance
    pub tender_managers: Vec<Uuid>,
    /// May mark protocols as paid
    pub finance_officers: Vec<Uuid>,
    /// Days between payment and the delivery follow-up calendar entry
    #[serde(default = "default_followup_days")]
    pub payment_followup_days: i64,
    /// Per-event recipient overrides
    #[serde(default)]
    pub recipients: HashMap<NotificationEvent, Vec<Uuid>>,
}

fn default_followup_days() -> i64 {
    14
}

impl Default for ApprovalRules {
    fn default() -> Self {
        Self {
            request_signers: vec![DIRECTOR, DEPUTY_DIRECTOR, PROCUREMENT_HEAD],
            protocol_signers: vec![DIRECTOR, PROCUREMENT_HEAD, CHIEF_ACCOUNTANT, LAWYER],
            protocol_auto_signer: PROCUREMENT_HEAD,
            supplier_admins: vec![PROCUREMENT_HEAD],
            tender_managers: vec![PROCUREMENT_HEAD],
            finance_officers: vec![CHIEF_ACCOUNTANT],
            payment_followup_days: default_followup_days(),
            recipients: HashMap::new(),
        }
    }
}

impl ApprovalRules {
    /// Load and validate rules from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RulesError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, RulesError> {
        let rules: ApprovalRules = serde_json::from_str(raw)?;
        rules.validate()?;
        Ok(rules)
    }

    pub fn validate(&self) -> Result<(), RulesError> {
        if self.request_signers.is_empty() {
            return Err(RulesError::Invalid("request_signers is empty".into()));
        }
        if self.protocol_signers.is_empty() {
            return Err(RulesError::Invalid("protocol_signers is empty".into()));
        }
        if !self.protocol_signers.contains(&self.protocol_auto_signer) {
            return Err(RulesError::Invalid(format!(
                "protocol_auto_signer {} is not a protocol signer",
                self.protocol_auto_signer
            )));
        }
        if self.tender_managers.is_empty() {
            return Err(RulesError::Invalid("tender_managers is empty".into()));
        }
        if self.finance_officers.is_empty() {
            return Err(RulesError::Invalid("finance_officers is empty".into()));
        }
        if !(0..=MAX_FOLLOWUP_DAYS).contains(&self.payment_followup_days) {
            return Err(RulesError::Invalid(format!(
                "payment_followup_days must be between 0 and {}",
                MAX_FOLLOWUP_DAYS
            )));
        }
        Ok(())
    }

    /// Signer list for entities that collect signatures
    pub fn required_signers(&self, kind: EntityKind) -> &[Uuid] {
        match kind {
            EntityKind::Request => &self.request_signers,
            EntityKind::Protocol => &self.protocol_signers,
            _ => &[],
        }
    }

    pub fn is_request_signer(&self, user: Uuid) -> bool {
        self.request_signers.contains(&user)
    }

    pub fn is_protocol_signer(&self, user: Uuid) -> bool {
        self.protocol_signers.contains(&user)
    }

    pub fn is_tender_manager(&self, user: Uuid) -> bool {
        self.tender_managers.contains(&user)
    }

    pub fn is_finance_officer(&self, user: Uuid) -> bool {
        self.finance_officers.contains(&user)
    }

    /// Supplier offers are editable by their author and by supplier admins
    pub fn can_edit_supplier(&self, user: Uuid, created_by: Uuid) -> bool {
        user == created_by || self.supplier_admins.contains(&user)
    }

    /// Fixed recipient list for an event, without duplicates
    pub fn recipients_for(&self, event: NotificationEvent) -> Vec<Uuid> {
        let source: &[Uuid] = match self.recipients.get(&event) {
            Some(list) => list,
            None => match event {
                NotificationEvent::RequestCreated => &self.request_signers,
                NotificationEvent::RequestApproved
                | NotificationEvent::TenderCreated
                | NotificationEvent::OfferSubmitted
                | NotificationEvent::TenderCancelled
                | NotificationEvent::ProtocolReady
                | NotificationEvent::ProtocolPaid => &self.tender_managers,
                NotificationEvent::TenderCompleted | NotificationEvent::ProtocolCreated => {
                    &self.protocol_signers
                }
                NotificationEvent::FinanceSubmitted => &self.finance_officers,
            },
        };

        let mut out = Vec::with_capacity(source.len());
        for id in source {
            if !out.contains(id) {
                out.push(*id);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules_are_valid() {
        let rules = ApprovalRules::default();
        rules.validate().unwrap();
        assert_eq!(rules.request_signers.len(), 3);
        assert_eq!(rules.protocol_signers.len(), 4);
    }

    #[test]
    fn test_default_recipient_sets() {
        let rules = ApprovalRules::default();
        assert_eq!(
            rules.recipients_for(NotificationEvent::RequestCreated),
            vec![DIRECTOR, DEPUTY_DIRECTOR, PROCUREMENT_HEAD]
        );
        assert_eq!(
            rules.recipients_for(NotificationEvent::ProtocolCreated),
            vec![DIRECTOR, PROCUREMENT_HEAD, CHIEF_ACCOUNTANT, LAWYER]
        );
        assert_eq!(
            rules.recipients_for(NotificationEvent::TenderCompleted),
            vec![DIRECTOR, PROCUREMENT_HEAD, CHIEF_ACCOUNTANT, LAWYER]
        );
        assert_eq!(
            rules.recipients_for(NotificationEvent::FinanceSubmitted),
            vec![CHIEF_ACCOUNTANT]
        );
        for event in [
            NotificationEvent::RequestApproved,
            NotificationEvent::TenderCreated,
            NotificationEvent::OfferSubmitted,
            NotificationEvent::TenderCancelled,
            NotificationEvent::ProtocolReady,
            NotificationEvent::ProtocolPaid,
        ] {
            assert_eq!(rules.recipients_for(event), vec![PROCUREMENT_HEAD]);
        }
    }

    #[test]
    fn test_recipient_override_is_deduplicated() {
        let mut rules = ApprovalRules::default();
        rules.recipients.insert(
            NotificationEvent::ProtocolPaid,
            vec![LAWYER, DIRECTOR, LAWYER],
        );
        assert_eq!(
            rules.recipients_for(NotificationEvent::ProtocolPaid),
            vec![LAWYER, DIRECTOR]
        );
    }

    #[test]
    fn test_from_json_with_overrides() {
        let raw = r#"{
            "request_signers": ["00000000-0000-0000-0000-00000000000a"],
            "protocol_signers": ["00000000-0000-0000-0000-00000000000b"],
            "protocol_auto_signer": "00000000-0000-0000-0000-00000000000b",
            "supplier_admins": [],
            "tender_managers": ["00000000-0000-0000-0000-00000000000c"],
            "finance_officers": ["00000000-0000-0000-0000-00000000000d"],
            "recipients": {
                "request_created": ["00000000-0000-0000-0000-00000000000c"]
            }
        }"#;
        let rules = ApprovalRules::from_json(raw).unwrap();
        assert_eq!(rules.payment_followup_days, 14);
        assert_eq!(
            rules.recipients_for(NotificationEvent::RequestCreated),
            vec![Uuid::from_u128(0xc)]
        );
    }

    #[test]
    fn test_auto_signer_must_be_protocol_signer() {
        let rules = ApprovalRules {
            protocol_auto_signer: Uuid::new_v4(),
            ..ApprovalRules::default()
        };
        assert!(matches!(rules.validate(), Err(RulesError::Invalid(_))));
    }

    #[test]
    fn test_followup_days_bounds() {
        let rules = ApprovalRules {
            payment_followup_days: MAX_FOLLOWUP_DAYS,
            ..ApprovalRules::default()
        };
        rules.validate().unwrap();

        for days in [-1, MAX_FOLLOWUP_DAYS + 1, 1_000_000_000_000_000] {
            let rules = ApprovalRules {
                payment_followup_days: days,
                ..ApprovalRules::default()
            };
            assert!(matches!(rules.validate(), Err(RulesError::Invalid(_))));
        }

        let raw = r#"{
            "request_signers": ["00000000-0000-0000-0000-00000000000a"],
            "protocol_signers": ["00000000-0000-0000-0000-00000000000b"],
            "protocol_auto_signer": "00000000-0000-0000-0000-00000000000b",
            "supplier_admins": [],
            "tender_managers": ["00000000-0000-0000-0000-00000000000c"],
            "finance_officers": ["00000000-0000-0000-0000-00000000000d"],
            "payment_followup_days": 1000000000000000
        }"#;
        assert!(matches!(
            ApprovalRules::from_json(raw),
            Err(RulesError::Invalid(_))
        ));
    }

    #[test]
    fn test_empty_signers_rejected() {
        let rules = ApprovalRules {
            request_signers: vec![],
            ..ApprovalRules::default()
        };
        assert!(rules.validate().is_err());
    }

    #[test]
    fn test_permissions() {
        let rules = ApprovalRules::default();
        let author = Uuid::new_v4();
        let stranger = Uuid::new_v4();

        assert!(rules.can_edit_supplier(author, author));
        assert!(rules.can_edit_supplier(PROCUREMENT_HEAD, author));
        assert!(!rules.can_edit_supplier(stranger, author));

        assert!(rules.is_request_signer(DEPUTY_DIRECTOR));
        assert!(!rules.is_protocol_signer(DEPUTY_DIRECTOR));
        assert!(rules.is_finance_officer(CHIEF_ACCOUNTANT));
        assert!(!rules.is_tender_manager(CHIEF_ACCOUNTANT));
        assert!(rules.required_signers(EntityKind::Tender).is_empty());
    }

    #[test]
    fn test_load_missing_file() {
        let result = ApprovalRules::load("/nonexistent/rules.json");
        assert!(matches!(result, Err(RulesError::Io(_))));
    }
}
