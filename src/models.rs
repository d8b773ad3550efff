//! Data models for the procurement pipeline

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of entity a signature, task, notification or audit entry refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Request,
    Tender,
    Supplier,
    Protocol,
    ArchivedProtocol,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Request => "request",
            EntityKind::Tender => "tender",
            EntityKind::Supplier => "supplier",
            EntityKind::Protocol => "protocol",
            EntityKind::ArchivedProtocol => "archived_protocol",
        }
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "request" => Ok(EntityKind::Request),
            "tender" => Ok(EntityKind::Tender),
            "supplier" => Ok(EntityKind::Supplier),
            "protocol" => Ok(EntityKind::Protocol),
            "archived_protocol" => Ok(EntityKind::ArchivedProtocol),
            _ => Err(format!("Invalid entity kind: {}", s)),
        }
    }
}

/// A single signature on a request or protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub user_id: Uuid,
    pub signed_at: DateTime<Utc>,
}

// Requests

/// How a request is procured: through a tender (bank transfer) or paid in cash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Transfer,
    Cash,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Transfer => "transfer",
            RequestKind::Cash => "cash",
        }
    }
}

impl std::str::FromStr for RequestKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transfer" => Ok(RequestKind::Transfer),
            "cash" => Ok(RequestKind::Cash),
            _ => Err(format!("Invalid request kind: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Collecting signatures
    Draft,
    /// Quorum reached, follow-on entity not yet attached
    Signed,
    /// A tender was opened for this request
    InTender,
    /// A cash protocol was created for this request
    InProtocol,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Draft => "draft",
            RequestStatus::Signed => "signed",
            RequestStatus::InTender => "in_tender",
            RequestStatus::InProtocol => "in_protocol",
            RequestStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(RequestStatus::Draft),
            "signed" => Ok(RequestStatus::Signed),
            "in_tender" => Ok(RequestStatus::InTender),
            "in_protocol" => Ok(RequestStatus::InProtocol),
            "cancelled" => Ok(RequestStatus::Cancelled),
            _ => Err(format!("Invalid request status: {}", s)),
        }
    }
}

/// One position of a purchase request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestItem {
    pub id: Uuid,
    pub name: String,
    pub quantity: f64,
    pub unit: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_price: Option<f64>,
}

impl RequestItem {
    /// Estimated line total, zero when no price was given
    pub fn estimated_total(&self) -> f64 {
        self.estimated_price.unwrap_or(0.0) * self.quantity
    }
}

/// A purchase request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: Uuid,
    pub title: String,
    pub kind: RequestKind,
    pub category: String,
    pub status: RequestStatus,
    pub items: Vec<RequestItem>,
    pub signatures: Vec<Signature>,
    pub created_by: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Request {
    pub fn estimated_total(&self) -> f64 {
        self.items.iter().map(RequestItem::estimated_total).sum()
    }
}

// Tenders

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenderStatus {
    Active,
    Completed,
    Cancelled,
}

impl TenderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenderStatus::Active => "active",
            TenderStatus::Completed => "completed",
            TenderStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for TenderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(TenderStatus::Active),
            "completed" => Ok(TenderStatus::Completed),
            "cancelled" => Ok(TenderStatus::Cancelled),
            _ => Err(format!("Invalid tender status: {}", s)),
        }
    }
}

/// A supplier's offer on a tender
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Supplier {
    pub id: Uuid,
    pub tender_id: Uuid,
    pub company_name: String,
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_per_unit: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposal_url: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tender {
    pub id: Uuid,
    pub request_id: Uuid,
    pub title: String,
    pub category: String,
    pub status: TenderStatus,
    pub suppliers: Vec<Supplier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reserve_winner_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Tender {
    pub fn supplier(&self, id: Uuid) -> Option<&Supplier> {
        self.suppliers.iter().find(|s| s.id == id)
    }
}

// Protocols

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolKind {
    Tender,
    Cash,
}

impl ProtocolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolKind::Tender => "tender",
            ProtocolKind::Cash => "cash",
        }
    }
}

impl std::str::FromStr for ProtocolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tender" => Ok(ProtocolKind::Tender),
            "cash" => Ok(ProtocolKind::Cash),
            _ => Err(format!("Invalid protocol kind: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolStatus {
    Signing,
    ReadyToNumber,
    Numbered,
    Archived,
}

impl ProtocolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolStatus::Signing => "signing",
            ProtocolStatus::ReadyToNumber => "ready_to_number",
            ProtocolStatus::Numbered => "numbered",
            ProtocolStatus::Archived => "archived",
        }
    }
}

impl std::str::FromStr for ProtocolStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "signing" => Ok(ProtocolStatus::Signing),
            "ready_to_number" => Ok(ProtocolStatus::ReadyToNumber),
            "numbered" => Ok(ProtocolStatus::Numbered),
            "archived" => Ok(ProtocolStatus::Archived),
            _ => Err(format!("Invalid protocol status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinanceStatus {
    NotSubmitted,
    /// Numbered and queued for the finance department
    Waiting,
    Submitted,
    Paid,
}

impl FinanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinanceStatus::NotSubmitted => "not_submitted",
            FinanceStatus::Waiting => "waiting",
            FinanceStatus::Submitted => "submitted",
            FinanceStatus::Paid => "paid",
        }
    }
}

impl std::str::FromStr for FinanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_submitted" => Ok(FinanceStatus::NotSubmitted),
            "waiting" => Ok(FinanceStatus::Waiting),
            "submitted" => Ok(FinanceStatus::Submitted),
            "paid" => Ok(FinanceStatus::Paid),
            _ => Err(format!("Invalid finance status: {}", s)),
        }
    }
}

/// The contractual record of a procurement decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Protocol {
    pub id: Uuid,
    pub kind: ProtocolKind,
    /// Set for tender protocols
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tender_id: Option<Uuid>,
    pub request_id: Uuid,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supplier_name: Option<String>,
    pub amount: f64,
    pub status: ProtocolStatus,
    pub finance_status: FinanceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    pub signatures: Vec<Signature>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numbered_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
}

/// A generated document stored with an archived protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedDocument {
    pub name: String,
    pub mime_type: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedProtocol {
    pub id: Uuid,
    pub protocol_id: Uuid,
    pub number: String,
    pub title: String,
    pub amount: f64,
    pub documents: Vec<ArchivedDocument>,
    pub archived_at: DateTime<Utc>,
}

// Calendar, tasks, notifications, users

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: Uuid,
    pub title: String,
    pub date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Open,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Open => "open",
            TaskStatus::Done => "done",
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(TaskStatus::Open),
            "done" => Ok(TaskStatus::Done),
            _ => Err(format!("Invalid task status: {}", s)),
        }
    }
}

/// A to-do item for a user, e.g. "sign protocol X"
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub assignee_id: Uuid,
    pub title: String,
    pub entity_kind: EntityKind,
    pub entity_id: Uuid,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// In-app copy of a dispatched message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub event: String,
    pub message: String,
    pub entity_kind: EntityKind,
    pub entity_id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub full_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telegram_chat_id: Option<i64>,
}

/// One recorded status transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub entity_kind: EntityKind,
    pub entity_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_status: Option<String>,
    pub to_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<Uuid>,
    pub at: DateTime<Utc>,
}

// Inputs

#[derive(Debug, Clone, Deserialize)]
pub struct NewRequestItem {
    pub name: String,
    pub quantity: f64,
    pub unit: String,
    pub estimated_price: Option<f64>,
}

/// Request to create a new purchase request
#[derive(Debug, Clone, Deserialize)]
pub struct NewRequest {
    pub title: String,
    pub kind: RequestKind,
    #[serde(default)]
    pub category: String,
    pub items: Vec<NewRequestItem>,
}

/// Request to add a supplier offer to a tender
#[derive(Debug, Clone, Deserialize)]
pub struct NewSupplier {
    pub company_name: String,
    pub price: f64,
    pub price_per_unit: Option<f64>,
    pub proposal_url: Option<String>,
}

/// Partial update of a supplier offer
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SupplierPatch {
    pub company_name: Option<String>,
    pub price: Option<f64>,
    pub price_per_unit: Option<f64>,
    pub proposal_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectWinner {
    pub winner_id: Uuid,
    pub reserve_winner_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpsertUser {
    pub full_name: String,
    pub telegram_chat_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_strings_round_trip() {
        for status in [
            RequestStatus::Draft,
            RequestStatus::Signed,
            RequestStatus::InTender,
            RequestStatus::InProtocol,
            RequestStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<RequestStatus>().unwrap(), status);
        }
        for status in [
            FinanceStatus::NotSubmitted,
            FinanceStatus::Waiting,
            FinanceStatus::Submitted,
            FinanceStatus::Paid,
        ] {
            assert_eq!(status.as_str().parse::<FinanceStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_invalid_strings_rejected() {
        assert!("wire".parse::<RequestKind>().is_err());
        assert!("open".parse::<TenderStatus>().is_err());
        assert!("numbering".parse::<ProtocolStatus>().is_err());
        assert!("user".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&ProtocolStatus::ReadyToNumber).unwrap();
        assert_eq!(json, "\"ready_to_number\"");
        let kind: EntityKind = serde_json::from_str("\"archived_protocol\"").unwrap();
        assert_eq!(kind, EntityKind::ArchivedProtocol);
    }

    #[test]
    fn test_request_estimated_total() {
        let now = Utc::now();
        let request = Request {
            id: Uuid::new_v4(),
            title: "Paper".to_string(),
            kind: RequestKind::Cash,
            category: "office".to_string(),
            status: RequestStatus::Draft,
            items: vec![
                RequestItem {
                    id: Uuid::new_v4(),
                    name: "A4".to_string(),
                    quantity: 10.0,
                    unit: "pack".to_string(),
                    estimated_price: Some(350.0),
                },
                RequestItem {
                    id: Uuid::new_v4(),
                    name: "Pens".to_string(),
                    quantity: 5.0,
                    unit: "box".to_string(),
                    estimated_price: None,
                },
            ],
            signatures: vec![],
            created_by: Uuid::new_v4(),
            signed_at: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(request.estimated_total(), 3500.0);
    }
}
