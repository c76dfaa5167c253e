pub mod audit;
pub mod config;
pub mod contact;
pub mod domain;
pub mod errors;

pub use audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use config::{AppConfig, ConfigError, LoadOptions, StrategistMode};
pub use contact::{ContactExtractor, ContactMatch};
pub use domain::lead::{
    LeadExtraction, LeadField, LeadMemory, PurchaseIntent, Sophistication, Urgency,
    DECLINED_PLACEHOLDER,
};
pub use domain::record::{LeadRecord, RecordTag};
pub use domain::strategy::{AuditAction, AuditSignal, DecisionSource, StrategyDecision, Tactic};
pub use errors::{DomainError, InterfaceError};
