use std::collections::{BTreeMap, BTreeSet};

/// Policies the server ships with and that must survive any apply
pub const PROTECTED_POLICIES: &[&str] = &["root", "default"];

/// The operations needed to bring one remote category in line with
///  its local declaration.
///
/// Every local entry is written, whether or not it changed: there is no
///  content comparison, so formatting drift on the server never hides
///  a real difference. `writes` and `deletes` never share a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan<T> {
    pub writes: BTreeMap<String, T>,
    pub deletes: BTreeSet<String>,
}

impl<T> Plan<T> {
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.deletes.is_empty()
    }

    /// Total number of remote operations in the plan
    pub fn len(&self) -> usize {
        self.writes.len() + self.deletes.len()
    }
}

/// Diff a local name -> content mapping against the names present remotely.
///
/// Remote names absent locally are deleted unless listed in `protected`.
///  With an empty local mapping and nothing protected, every remote name
///  is deleted.
pub fn plan<T, I>(local: BTreeMap<String, T>, remote: I, protected: &[&str]) -> Plan<T>
where
    I: IntoIterator<Item = String>,
{
    let mut deletes = BTreeSet::new();

    for name in remote {
        if local.contains_key(&name) {
            continue;
        }
        if protected.contains(&name.as_str()) {
            tracing::debug!(name = %name, "skipping deletion of protected object");
            continue;
        }
        deletes.insert(name);
    }

    Plan {
        writes: local,
        deletes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn remote(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_writes_every_local_entry() {
        let plan = plan(
            local(&[("p1", "bodyA"), ("p2", "bodyB")]),
            remote(&["p1", "p3"]),
            PROTECTED_POLICIES,
        );

        assert_eq!(plan.writes.len(), 2);
        assert_eq!(plan.writes["p1"], "bodyA");
        assert_eq!(plan.writes["p2"], "bodyB");
        assert_eq!(plan.deletes, BTreeSet::from(["p3".to_string()]));
        assert_eq!(plan.len(), 3);
    }

    #[test]
    fn test_protected_names_never_deleted() {
        let plan = plan(
            BTreeMap::<String, String>::new(),
            remote(&["root", "default", "stale"]),
            PROTECTED_POLICIES,
        );

        assert!(plan.writes.is_empty());
        assert_eq!(plan.deletes, BTreeSet::from(["stale".to_string()]));
    }

    #[test]
    fn test_protected_names_still_written_when_local() {
        let plan = plan(
            local(&[("default", "custom")]),
            remote(&["default", "root"]),
            PROTECTED_POLICIES,
        );

        assert_eq!(plan.writes["default"], "custom");
        assert!(plan.deletes.is_empty());
    }

    #[test]
    fn test_empty_local_without_protection_deletes_everything() {
        let plan = plan(
            BTreeMap::<String, String>::new(),
            remote(&["a", "b", "root"]),
            &[],
        );

        assert_eq!(plan.deletes.len(), 3);
        assert!(plan.deletes.contains("root"));
    }

    #[test]
    fn test_writes_and_deletes_disjoint() {
        let plan = plan(
            local(&[("a", "1"), ("b", "2"), ("c", "3")]),
            remote(&["b", "c", "d", "e"]),
            &[],
        );

        for name in &plan.deletes {
            assert!(!plan.writes.contains_key(name));
        }
        assert_eq!(
            plan.deletes,
            BTreeSet::from(["d".to_string(), "e".to_string()])
        );
    }

    #[test]
    fn test_empty_plan() {
        let plan = plan(BTreeMap::<String, String>::new(), remote(&[]), &[]);
        assert!(plan.is_empty());
        assert_eq!(plan.len(), 0);
    }
}
