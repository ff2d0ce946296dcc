//! Compliance engine integration tests

use chrono::{Duration, Utc};
use pii_compliance::compliance::*;
use pii_compliance::config::ComplianceConfig;
use pii_compliance::crypto::{context, hash_identifier};
use pii_compliance::repository::{
    Collection, CommunicationLogRepository, InMemoryStore, SubjectRepository,
};
use pii_compliance::Error;

const KEY: &str = "4f1c2a9b8e7d6c5b4a39281706f5e4d3c2b1a09f8e7d6c5b4a3928170615f4e3";

fn engine() -> (ComplianceEngine, InMemoryStore) {
    let store = InMemoryStore::new();
    let config = ComplianceConfig::new(KEY).with_salts("phone-salt-test", "id-salt-test");
    let engine = ComplianceEngine::new(&config, store.clone()).unwrap();
    (engine, store)
}

fn request() -> RequestContext {
    RequestContext::new("196.25.1.1", "integration-test/1.0")
}

async fn register_u1(engine: &ComplianceEngine) -> SubjectRecord {
    engine
        .register_subject(
            "u1",
            SubjectProfile {
                full_name: Some("Thandi Nkosi".to_string()),
                email: "thandi@example.com".to_string(),
                phone: Some("+27821234567".to_string()),
                national_id: Some("8001015009087".to_string()),
                address: Some("12 Long Street, Cape Town".to_string()),
            },
            &request(),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_missing_key_refuses_to_start() {
    let config = ComplianceConfig::default();
    let result = ComplianceEngine::new(&config, InMemoryStore::new());
    assert!(matches!(result, Err(Error::Configuration(_))));
}

#[tokio::test]
async fn test_phone_encryption_scenario() {
    let (engine, store) = engine();
    let record = register_u1(&engine).await;

    let stored = store.find("u1").await.unwrap().unwrap();
    let phone = stored.phone.clone().unwrap();
    assert_eq!(stored, record);
    assert_eq!(
        engine.cipher().decrypt(&phone, context::PHONE).unwrap(),
        "+27821234567"
    );
    assert!(matches!(
        engine.cipher().decrypt(&phone, context::EMAIL),
        Err(Error::Decryption(_))
    ));
    assert_eq!(
        stored.phone_hash.unwrap(),
        hash_identifier("+27821234567", "phone-salt-test")
    );
}

#[tokio::test]
async fn test_consent_withdrawal_scenario() {
    let (engine, _) = engine();
    let t0 = Utc::now() - Duration::minutes(5);

    engine
        .consents()
        .record_consent(
            "u1",
            &[ConsentGrant::given(
                DataCategory::FinancialData,
                ProcessingPurpose::BillingPayment,
                LegalBasis::Consent,
                "2024-06",
            )
            .at(t0)],
            &request(),
        )
        .await
        .unwrap();
    assert!(
        engine
            .consents()
            .has_active_consent("u1", DataCategory::FinancialData, ProcessingPurpose::BillingPayment)
            .await
    );

    engine
        .consents()
        .withdraw_consent("u1", DataCategory::FinancialData, ProcessingPurpose::BillingPayment)
        .await
        .unwrap();

    assert!(
        !engine
            .consents()
            .has_active_consent("u1", DataCategory::FinancialData, ProcessingPurpose::BillingPayment)
            .await
    );

    let history = engine.consents().consent_history("u1").await.unwrap();
    assert!(!history.is_empty());
    assert_eq!(history[0].consented_at, t0);
    assert!(history[0].consent_given);
    assert!(history[0].withdrawn_at.unwrap() > t0);
}

#[tokio::test]
async fn test_export_decrypts_all_fields() {
    let (engine, _) = engine();
    register_u1(&engine).await;

    let bundle = engine.export_data("u1", &request()).await.unwrap();

    assert!(bundle.is_complete());
    assert_eq!(bundle.profile["full_name"], "Thandi Nkosi");
    assert_eq!(bundle.profile["phone"], "+27821234567");
    assert_eq!(bundle.profile["national_id"], "8001015009087");
    assert_eq!(bundle.profile["address"], "12 Long Street, Cape Town");
    assert_eq!(bundle.metadata.legal_basis, LegalBasis::LegalObligation);

    let history = bundle.access_history.unwrap();
    assert!(history
        .iter()
        .any(|e| e.action == AccessAction::Export && e.purpose == ProcessingPurpose::LegalCompliance));
}

#[tokio::test]
async fn test_export_flags_undecryptable_field() {
    let (engine, store) = engine();
    let mut record = register_u1(&engine).await;

    // Address ciphertext moved into the name column: context no longer matches
    record.full_name = record.address.clone();
    store.upsert(&record).await.unwrap();

    let bundle = engine.export_data("u1", &request()).await.unwrap();

    assert!(!bundle.is_complete());
    assert_eq!(bundle.failed_fields.len(), 1);
    assert_eq!(bundle.failed_fields[0].field, "full_name");
    assert!(!bundle.profile.contains_key("full_name"));
    assert_eq!(bundle.profile["phone"], "+27821234567");
}

#[tokio::test]
async fn test_export_survives_audit_outage() {
    let (engine, store) = engine();
    register_u1(&engine).await;
    store.set_failing(Collection::AccessLog, true);

    let bundle = engine.export_data("u1", &request()).await.unwrap();

    assert_eq!(bundle.profile["phone"], "+27821234567");
    assert!(bundle.access_history.is_none());
    assert_eq!(engine.audit().dropped_entries(), 1);
}

#[tokio::test]
async fn test_export_unknown_subject() {
    let (engine, _) = engine();
    assert!(matches!(
        engine.export_data("ghost", &request()).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn test_overdue_bill_forces_anonymization() {
    let (engine, store) = engine();
    register_u1(&engine).await;
    let bill = BillRecord::new("u1", 45_000, BillStatus::Overdue);
    store.insert_bill(bill.clone()).await;

    let report = engine
        .delete_data("u1", "subject request", &request())
        .await
        .unwrap();

    assert_eq!(report.outcome, ErasureOutcome::Anonymized);
    assert!(report.assessment.outstanding_financial);
    assert_eq!(
        report.states,
        vec![
            ErasureState::Requested,
            ErasureState::ObligationChecked,
            ErasureState::Anonymized,
            ErasureState::Logged,
        ]
    );

    let subject = store.find("u1").await.unwrap().unwrap();
    assert_eq!(subject.email, "deleted_u1@anonymized.invalid");
    assert!(subject.full_name.is_none());
    assert!(subject.phone.is_none());
    assert!(subject.phone_hash.is_none());
    assert!(subject.national_id.is_none());
    assert!(subject.national_id_hash.is_none());
    assert!(subject.address.is_none());
    assert!(!subject.is_active);

    let bills = pii_compliance::repository::BillingRepository::bills_for_subject(&store, "u1")
        .await
        .unwrap();
    assert_eq!(bills, vec![bill]);
}

#[tokio::test]
async fn test_recent_communication_forces_anonymization() {
    let (engine, store) = engine();
    register_u1(&engine).await;
    store
        .insert_message(MessageRecord::new("u1", Channel::ChatMessage, Utc::now() - Duration::days(200)))
        .await;

    let report = engine
        .delete_data("u1", "subject request", &request())
        .await
        .unwrap();

    assert_eq!(report.outcome, ErasureOutcome::Anonymized);
    assert!(report.assessment.recent_communications);
}

#[tokio::test]
async fn test_logged_sms_from_subject_phone_forces_anonymization() {
    let (engine, _) = engine();
    register_u1(&engine).await;

    let outcome = engine
        .communications()
        .log_communication(
            "+27821234567",
            "+27115550000",
            "Please call me back",
            Channel::Sms,
            Direction::Outbound,
        )
        .await;
    assert!(outcome.is_recorded());

    let report = engine
        .delete_data("u1", "subject request", &request())
        .await
        .unwrap();

    assert_eq!(report.outcome, ErasureOutcome::Anonymized);
    assert!(report.assessment.recent_communications);
    assert!(!report.assessment.outstanding_financial);
}

#[tokio::test]
async fn test_no_obligation_means_full_deletion() {
    let (engine, store) = engine();
    register_u1(&engine).await;
    store.insert_bill(BillRecord::new("u1", 100, BillStatus::Paid)).await;
    store
        .insert_message(MessageRecord::new("u1", Channel::Sms, Utc::now() - Duration::days(5 * 365)))
        .await;

    let report = engine
        .delete_data("u1", "account closed", &request())
        .await
        .unwrap();

    assert_eq!(report.outcome, ErasureOutcome::FullyDeleted);
    assert_eq!(report.states.last(), Some(&ErasureState::Logged));
    assert!(report.audit_recorded);
    assert!(store.find("u1").await.unwrap().is_none());
    assert!(matches!(
        engine.export_data("u1", &request()).await,
        Err(Error::NotFound(_))
    ));

    // The audit trail outlives the subject
    let trail = engine.audit().generate_report("u1").await.unwrap();
    let deletion = trail
        .iter()
        .find(|e| e.action == AccessAction::Delete)
        .unwrap();
    assert!(deletion.details.as_deref().unwrap().starts_with("fully_deleted"));
}

#[tokio::test]
async fn test_erasure_still_resolves_when_audit_is_down() {
    let (engine, store) = engine();
    register_u1(&engine).await;
    store.set_failing(Collection::AccessLog, true);

    let report = engine
        .delete_data("u1", "subject request", &request())
        .await
        .unwrap();

    assert_eq!(report.outcome, ErasureOutcome::FullyDeleted);
    assert!(!report.audit_recorded);
}

#[tokio::test]
async fn test_erasure_blocked_when_obligations_unknown() {
    let (engine, store) = engine();
    register_u1(&engine).await;
    store.set_failing(Collection::Messages, true);

    let result = engine.delete_data("u1", "subject request", &request()).await;

    assert!(matches!(result, Err(Error::Persistence(_))));
    assert!(store.find("u1").await.unwrap().is_some());
}

#[tokio::test]
async fn test_communication_log_and_sweep() {
    let (engine, store) = engine();
    let log = engine.communications();

    log.log_communication(
        "+27821234567",
        "support@example.com",
        "Hi, my router is down",
        Channel::Email,
        Direction::Inbound,
    )
    .await;

    let mut stale = log.build_entry("a", "b", "old", Channel::Sms, Direction::Outbound);
    stale.expires_at = Utc::now() - Duration::days(1);
    store.insert(&stale).await.unwrap();

    assert_eq!(store.count().await.unwrap(), 2);
    assert_eq!(log.sweep_expired().await.unwrap(), 1);
    assert_eq!(log.sweep_expired().await.unwrap(), 0);
    assert_eq!(store.count().await.unwrap(), 1);
}
