//! Recipient resolution — which official an alert goes to
//!
//! Fixed hierarchy per level. The guardian-secretary tier (level 4) has no
//! direct contact record, so it falls back downward through the hierarchy;
//! every other level resolves strictly to its own role's contact.

use crate::store::types::{EscalationLevel, Office};

/// A resolved alert recipient
#[derive(Debug, Clone, PartialEq)]
pub struct Recipient {
    /// Role the contact actually holds (may differ from the level's role
    /// when level 4 falls back)
    pub role: &'static str,
    pub name: Option<String>,
    /// Raw phone as stored; the dispatcher normalizes it
    pub phone: String,
}

fn head(office: &Office) -> Option<Recipient> {
    office.head_phone.as_ref().map(|phone| Recipient {
        role: "Office Head",
        name: office.head_name.clone(),
        phone: phone.clone(),
    })
}

fn collector(office: &Office) -> Option<Recipient> {
    office.collector_phone.as_ref().map(|phone| Recipient {
        role: "District Collector",
        name: office.collector_name.clone(),
        phone: phone.clone(),
    })
}

fn commissioner(office: &Office) -> Option<Recipient> {
    office.commissioner_phone.as_ref().map(|phone| Recipient {
        role: "Divisional Commissioner",
        name: office.commissioner_name.clone(),
        phone: phone.clone(),
    })
}

/// Resolve the contact for an alert at the given level.
///
/// `None` means no contact is on record for the level; the dispatcher
/// records the failed attempt in the audit log.
pub fn resolve_recipient(level: EscalationLevel, office: &Office) -> Option<Recipient> {
    match level {
        EscalationLevel::Level1 => head(office),
        EscalationLevel::Level2 => collector(office),
        EscalationLevel::Level3 => commissioner(office),
        // No guardian-secretary contact record exists; fall back upward
        // through the chain of command
        EscalationLevel::Level4 => commissioner(office)
            .or_else(|| collector(office))
            .or_else(|| head(office)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_office() -> Office {
        Office::new("OFF-1", "Pune Tehsil Office", "Revenue", "Pune")
            .with_head("A. Deshmukh", "9800000001")
            .with_collector("B. Kulkarni", "9800000002")
            .with_commissioner("C. Patil", "9800000003")
    }

    #[test]
    fn test_levels_map_to_hierarchy() {
        let office = full_office();
        assert_eq!(
            resolve_recipient(EscalationLevel::Level1, &office).unwrap().role,
            "Office Head"
        );
        assert_eq!(
            resolve_recipient(EscalationLevel::Level2, &office).unwrap().role,
            "District Collector"
        );
        assert_eq!(
            resolve_recipient(EscalationLevel::Level3, &office).unwrap().role,
            "Divisional Commissioner"
        );
    }

    #[test]
    fn test_level4_falls_back_to_commissioner() {
        let office = full_office();
        let recipient = resolve_recipient(EscalationLevel::Level4, &office).unwrap();
        assert_eq!(recipient.role, "Divisional Commissioner");
        assert_eq!(recipient.phone, "9800000003");
    }

    #[test]
    fn test_level4_fallback_chain() {
        let mut office = full_office();
        office.commissioner_phone = None;
        assert_eq!(
            resolve_recipient(EscalationLevel::Level4, &office).unwrap().role,
            "District Collector"
        );

        office.collector_phone = None;
        assert_eq!(
            resolve_recipient(EscalationLevel::Level4, &office).unwrap().role,
            "Office Head"
        );

        office.head_phone = None;
        assert_eq!(resolve_recipient(EscalationLevel::Level4, &office), None);
    }

    #[test]
    fn test_lower_levels_do_not_fall_back() {
        let mut office = full_office();
        office.collector_phone = None;
        assert_eq!(resolve_recipient(EscalationLevel::Level2, &office), None);
    }
}
