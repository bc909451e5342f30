/// Maps bean names to session attribute names for one conversation.
///
/// Attribute names have the form `<prefix>.<cid>.<bean>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingScheme {
    namespace: String,
}

impl NamingScheme {
    pub const DEFAULT_PREFIX: &'static str = "colloquy.conversation";

    #[must_use]
    pub fn new(prefix: &str, cid: &str) -> Self {
        Self {
            namespace: format!("{prefix}.{cid}."),
        }
    }

    #[must_use]
    pub fn for_conversation(cid: &str) -> Self {
        Self::new(Self::DEFAULT_PREFIX, cid)
    }

    #[must_use]
    pub fn prefix(&self, bean: &str) -> String {
        format!("{}{bean}", self.namespace)
    }

    /// Recover the bean name from an attribute owned by this scheme.
    #[must_use]
    pub fn deprefix<'a>(&self, attribute: &'a str) -> Option<&'a str> {
        attribute.strip_prefix(self.namespace.as_str())
    }

    #[must_use]
    pub fn owns(&self, attribute: &str) -> bool {
        attribute.starts_with(self.namespace.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_round_trip() {
        let scheme = NamingScheme::for_conversation("7");
        let attribute = scheme.prefix("cart");
        assert_eq!(attribute, "colloquy.conversation.7.cart");
        assert_eq!(scheme.deprefix(&attribute), Some("cart"));
    }

    #[test]
    fn test_conversations_do_not_overlap() {
        let one = NamingScheme::for_conversation("1");
        let eleven = NamingScheme::for_conversation("11");

        let attribute = eleven.prefix("cart");
        assert!(!one.owns(&attribute));
        assert_eq!(one.deprefix(&attribute), None);
        assert!(eleven.owns(&attribute));
    }
}
