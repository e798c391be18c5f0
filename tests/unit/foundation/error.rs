use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        RenderError::validation("x")
            .to_string()
            .contains("validation error:")
    );
    assert!(
        RenderError::allocation("x")
            .to_string()
            .contains("allocation error:")
    );
    assert!(RenderError::filter("x").to_string().contains("filter error:"));
    assert!(RenderError::usage("x").to_string().contains("usage error:"));
    assert!(
        RenderError::rejected("x")
            .to_string()
            .contains("submission rejected:")
    );
}

#[test]
fn only_usage_errors_report_is_usage() {
    assert!(RenderError::usage("two flat operands").is_usage());
    assert!(!RenderError::filter("boom").is_usage());
    assert!(!RenderError::allocation("oom").is_usage());
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = RenderError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
}
