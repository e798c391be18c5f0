use super::*;
use crate::foundation::core::Color;

#[test]
fn ready_future_peeks_immediately() {
    let f = FilterFuture::ready(Ok(FilterResult::Color(Color::WHITE)));
    assert!(f.is_ready());
    assert!(matches!(f.peek(), Some(Ok(FilterResult::Color(c))) if c == Color::WHITE));
}

#[test]
fn channel_completes_every_clone() {
    let (promise, f) = FilterFuture::channel();
    let g = f.clone();
    assert!(f.peek().is_none());
    let h = std::thread::spawn(move || g.wait());
    promise.complete(Ok(FilterResult::transparent()));
    assert!(h.join().unwrap().unwrap().is_transparent_color());
    assert!(f.is_ready());
}

#[test]
fn dropped_promise_abandons() {
    let (promise, f) = FilterFuture::channel();
    drop(promise);
    assert_eq!(f.wait().unwrap_err(), FilterFailure::Abandoned);
}

#[test]
fn usage_survives_error_conversions() {
    let f: FilterFailure = RenderError::usage("bad operands").into();
    assert!(f.is_usage());
    let back: RenderError = f.into();
    assert!(back.is_usage());

    let f: FilterFailure = RenderError::allocation("oom").into();
    assert!(matches!(f, FilterFailure::Failed(ref m) if m.contains("oom")));
    assert!(matches!(RenderError::from(FilterFailure::Abandoned), RenderError::Filter(_)));
}
