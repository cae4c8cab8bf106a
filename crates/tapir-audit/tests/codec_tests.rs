//! Codec behaviour across the whole action vocabulary.

use tapir_audit::{
    construct_by_action, decode_by_action, AdminAuditEvent, AuditActionKind, AuditEnvelope,
    AuditEntry, AuditError, AuditPayload, Endorsement, FlagSetting, HistoryEntry, PayloadFields,
    UserFlag, VetoStatus,
};
use tapir_db::TapirAdminAudit;

fn envelope() -> AuditEnvelope {
    AuditEnvelope::new(7, 42)
        .with_timestamp(1_717_171_717)
        .with_session_id(9001)
        .with_remote_ip("192.0.2.10")
        .with_remote_hostname("gw.example.org")
        .with_tracking_cookie("cookie-abc")
        .with_comment("requested by moderator")
}

/// One legally constructed payload per action kind.
fn sample_payload(kind: AuditActionKind) -> AuditPayload {
    let fields = match kind {
        AuditActionKind::AddComment | AuditActionKind::ChangePassword => PayloadFields::new(),
        AuditActionKind::SuspendUser | AuditActionKind::UnsuspendUser => PayloadFields::new(),
        k if k.is_paper_action() => PayloadFields::new().paper_id("2101.00001"),
        AuditActionKind::ArxivChangeStatus => PayloadFields::new().status_change("ok", "no-upload"),
        AuditActionKind::BecomeUser => PayloadFields::new().new_session_id(123_456),
        AuditActionKind::ChangeEmail => PayloadFields::new().email("new@example.org"),
        AuditActionKind::EndorsedBySuspect | AuditActionKind::GotNegativeEndorsement => {
            PayloadFields::new().endorsement("123", "cs.AI", "456")
        }
        AuditActionKind::FlipFlag => PayloadFields::new().flag("tapir_users.flag_banned", "yes"),
        AuditActionKind::MakeModerator | AuditActionKind::UnmakeModerator => {
            PayloadFields::new().category("math.CO")
        }
        _ => unreachable!("paper actions handled above"),
    };
    construct_by_action(kind.as_str(), &fields).expect("sample fields are valid")
}

fn as_row(event: &AdminAuditEvent, entry_id: u32) -> TapirAdminAudit {
    let new = event.to_record();
    TapirAdminAudit {
        entry_id,
        log_date: new.log_date,
        session_id: new.session_id,
        ip_addr: new.ip_addr,
        remote_host: new.remote_host,
        admin_user: Some(new.admin_user),
        affected_user: new.affected_user,
        tracking_cookie: new.tracking_cookie,
        action: new.action,
        data: new.data,
        comment: new.comment,
    }
}

#[test]
fn test_round_trip_every_action() {
    for kind in AuditActionKind::ALL {
        let event = AdminAuditEvent::new(envelope(), sample_payload(kind));
        assert_eq!(event.action(), kind);

        let decoded = AdminAuditEvent::decode(kind.as_str(), envelope(), &event.data())
            .unwrap_or_else(|e| panic!("{kind} failed to decode: {e}"));
        assert_eq!(decoded, event, "{kind}");
    }
}

#[test]
fn test_round_trip_through_audit_row() {
    for (i, kind) in AuditActionKind::ALL.into_iter().enumerate() {
        let event = AdminAuditEvent::new(envelope(), sample_payload(kind));
        let row = as_row(&event, i as u32 + 1);
        let decoded = AdminAuditEvent::from_record(&row).unwrap();
        assert_eq!(decoded, event, "{kind}");
    }
}

#[test]
fn test_round_trip_integer_flag() {
    let payload = AuditPayload::FlipFlag(
        FlagSetting::new(UserFlag::EndorsementPointValue, -10).unwrap(),
    );
    let data = payload.encode();
    assert_eq!(data, "arXiv_endorsements.point_value=-10");
    assert_eq!(decode_by_action("flip-flag", &data).unwrap(), payload);
}

#[test]
fn test_boolean_normalisation_through_registry() {
    for input in ["yes", "true", "1"] {
        let fields = PayloadFields::new().flag("tapir_users.flag_edit_users", input);
        let payload = construct_by_action("flip-flag", &fields).unwrap();
        assert_eq!(payload.encode(), "tapir_users.flag_edit_users=1");
    }
    for input in ["no", "false", "0"] {
        let fields = PayloadFields::new().flag("tapir_users.flag_edit_users", input);
        let payload = construct_by_action("flip-flag", &fields).unwrap();
        assert_eq!(payload.encode(), "tapir_users.flag_edit_users=0");
    }
    let fields = PayloadFields::new().flag("tapir_users.flag_edit_users", true);
    assert_eq!(
        construct_by_action("flip-flag", &fields).unwrap().encode(),
        "tapir_users.flag_edit_users=1"
    );
    let fields = PayloadFields::new().flag("tapir_users.flag_edit_users", 0);
    assert_eq!(
        construct_by_action("flip-flag", &fields).unwrap().encode(),
        "tapir_users.flag_edit_users=0"
    );

    let fields = PayloadFields::new().flag("tapir_users.flag_edit_users", "perhaps");
    let err = construct_by_action("flip-flag", &fields).unwrap_err();
    assert!(matches!(err, AuditError::Construction { .. }));
}

#[test]
fn test_endorsement_grammar() {
    let e = Endorsement::new(AuditActionKind::EndorsedBySuspect, "123", "cs.AI", "456").unwrap();
    assert_eq!(e.encode(), "123 cs.AI 456");

    let payload = decode_by_action("endorsed-by-suspect", "123 cs.AI 456").unwrap();
    assert_eq!(payload, AuditPayload::EndorsedBySuspect(e));

    let err = decode_by_action("endorsed-by-suspect", "bad data").unwrap_err();
    assert!(matches!(err, AuditError::Decode { ref data, .. } if data == "bad data"));
    assert!(err.to_string().contains("bad data"));
}

#[test]
fn test_endorsement_decode_rejects_bad_tokens() {
    for data in ["abc cs.AI 456", "123 csAI 456", "123 cs.AI", "123 cs.AI 456 789", "123  cs.AI 456"] {
        let err = decode_by_action("got-negative-endorsement", data).unwrap_err();
        assert!(
            matches!(err, AuditError::Decode { data: ref raw, .. } if raw == data),
            "{data}"
        );
    }
}

#[test]
fn test_status_change_grammar() {
    let payload = decode_by_action("arXiv-change-status", "ok -> no-upload").unwrap();
    assert_eq!(
        payload,
        AuditPayload::ArxivChangeStatus {
            before: VetoStatus::Ok,
            after: VetoStatus::NoUpload,
        }
    );
    let err = decode_by_action("arXiv-change-status", "ok -> bogus").unwrap_err();
    assert!(matches!(err, AuditError::Decode { .. }));
}

#[test]
fn test_become_user_requires_integer() {
    let err = decode_by_action("become-user", "abc").unwrap_err();
    assert!(matches!(err, AuditError::Decode { .. }));

    let fields = PayloadFields::new().new_session_id("not-a-number");
    let err = construct_by_action("become-user", &fields).unwrap_err();
    assert!(matches!(err, AuditError::Construction { ref field, .. } if field == "new_session_id"));
}

#[test]
fn test_registry_unknown_action() {
    let err = decode_by_action("not-a-real-action", "x").unwrap_err();
    assert!(matches!(err, AuditError::UnknownAction { ref tag } if tag == "not-a-real-action"));
    assert!(err.to_string().contains("not-a-real-action"));
}

#[test]
fn test_suspend_requires_fixed_payload() {
    assert_eq!(
        decode_by_action("suspend-user", "tapir_users.flag_banned=1").unwrap(),
        AuditPayload::SuspendUser
    );
    assert!(decode_by_action("suspend-user", "tapir_users.flag_banned=0").is_err());
    assert!(decode_by_action("unsuspend-user", "").is_err());
}

#[test]
fn test_empty_payload_actions_reject_data() {
    assert!(decode_by_action("add-comment", "").is_ok());
    assert!(decode_by_action("change-password", "hunter2").is_err());
}

#[test]
fn test_missing_required_fields() {
    let cases = [
        ("change-email", "email"),
        ("become-user", "new_session_id"),
        ("make-moderator", "category"),
        ("arXiv-change-status", "status_before"),
        ("endorsed-by-suspect", "endorser"),
        ("flip-flag", "flag"),
    ];
    for (tag, field_name) in cases {
        let err = construct_by_action(tag, &PayloadFields::new()).unwrap_err();
        assert!(
            matches!(err, AuditError::Construction { ref field, .. } if field == field_name),
            "{tag}: {err}"
        );
    }
}

#[test]
fn test_null_admin_user_is_corrupt() {
    let event = AdminAuditEvent::new(envelope(), AuditPayload::ChangePassword);
    let mut row = as_row(&event, 1);
    row.admin_user = None;
    let err = AdminAuditEvent::from_record(&row).unwrap_err();
    assert!(err.is_corrupt_row());
}

#[test]
fn test_empty_envelope_strings_round_trip() {
    let envelope = AuditEnvelope::new(7, 42)
        .with_timestamp(1_717_171_717)
        .with_remote_ip("")
        .with_remote_hostname("")
        .with_tracking_cookie("")
        .with_comment("");
    assert_eq!(envelope.remote_ip, None);
    assert_eq!(envelope.comment, None);

    let event = AdminAuditEvent::new(envelope, AuditPayload::ChangePassword);
    let decoded = AdminAuditEvent::from_record(&as_row(&event, 3)).unwrap();
    assert_eq!(decoded, event);
}

#[test]
fn test_audit_entry_decodes_stored_row() {
    let setting = FlagSetting::new(UserFlag::EditUsers, true).unwrap();
    let event = AdminAuditEvent::new(envelope(), AuditPayload::FlipFlag(setting));

    let entry = AuditEntry::from_record(&as_row(&event, 11)).unwrap();
    assert_eq!(entry.entry_id, 11);
    assert_eq!(entry.event, event);

    let mut corrupt = as_row(&event, 12);
    corrupt.data = "tapir_users.flag_edit_users".to_string();
    let err = AuditEntry::from_record(&corrupt).unwrap_err();
    assert!(matches!(err, AuditError::Decode { .. }), "{err}");
}

#[test]
fn test_history_keeps_corrupt_rows() {
    let good = AdminAuditEvent::new(envelope(), AuditPayload::SuspendUser);
    let mut bad = as_row(&good, 2);
    bad.action = "unsuspend-user".to_string();
    bad.data = "tapir_users.flag_banned=1".to_string();

    let history: Vec<HistoryEntry> = vec![as_row(&good, 1), bad]
        .into_iter()
        .map(HistoryEntry::from_record)
        .collect();

    assert_eq!(history.len(), 2);
    assert!(!history[0].is_corrupt());
    assert_eq!(history[0].decoded.as_ref().unwrap(), &good);
    assert!(history[1].is_corrupt());
    assert_eq!(history[1].record.entry_id, 2);
    assert_eq!(history[1].record.action, "unsuspend-user");
}
