use derive_more::Display;

///
/// Topic
/// Component tag attached to every log line so operators can filter a single
/// subsystem out of an interleaved reconcile stream.
///

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
#[remain::sorted]
pub enum Topic {
    Anchor,
    Cluster,
    Config,
    Forest,
    Hierarchy,
    Object,
    Validate,
}

#[macro_export]
macro_rules! log {
    // =========================================
    // (1) With topic (normal + trailing comma)
    // =========================================
    ($topic:expr, $level:ident, $fmt:expr $(, $arg:expr)* $(,)?) => {{
        ::tracing::event!(
            ::tracing::Level::$level,
            topic = %$topic,
            $fmt $(, $arg)*
        );
    }};

    // =========================================
    // (2) No topic (normal + trailing comma)
    // =========================================
    ($level:ident, $fmt:expr $(, $arg:expr)* $(,)?) => {{
        ::tracing::event!(::tracing::Level::$level, $fmt $(, $arg)*);
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_display_by_name() {
        assert_eq!(Topic::Hierarchy.to_string(), "Hierarchy");
        assert_eq!(Topic::Object.to_string(), "Object");
    }

    #[test]
    fn log_macro_expands() {
        log!(Topic::Forest, DEBUG, "node {} touched", "foo");
        log!(INFO, "no topic");
    }
}
