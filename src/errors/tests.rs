use super::*;

#[test]
fn transport_includes_status_in_message() {
    let err = MessagingError::transport(Some(503), "backend unavailable");
    let MessagingError::Transport { status, message } = &err else {
        panic!("expected transport variant");
    };
    assert_eq!(*status, Some(503));
    assert!(message.contains("503"));
    assert!(message.contains("backend unavailable"));
}

#[test]
fn transport_without_status_keeps_message() {
    let err = MessagingError::transport(None, "connection refused");
    assert_eq!(err.to_string(), "transport error: connection refused");
}

#[test]
fn verification_counts_as_unauthenticated() {
    assert!(MessagingError::Unauthenticated.is_unauthenticated());
    assert!(MessagingError::Verification("expired".into()).is_unauthenticated());
    assert!(!MessagingError::transport(None, "x").is_unauthenticated());
}

#[test]
fn anyhow_converts_to_internal() {
    fn inner() -> anyhow::Result<()> {
        anyhow::bail!("boom")
    }
    fn outer() -> Result<(), MessagingError> {
        inner()?;
        Ok(())
    }
    let err = outer().unwrap_err();
    assert!(matches!(err, MessagingError::Internal(_)));
}
