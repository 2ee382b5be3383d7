//! File-Splitting Planner.
//!
//! Partitions the declaration set into file buckets. Operation-owned
//! declarations are grouped by tag or path prefix and split further when a
//! threshold would be exceeded; shared declarations all land in one bucket.

use crate::config::{SplitOptions, SplitStrategy};
use crate::declarations::{DeclKind, GeneratedDeclaration, Origin};
use crate::naming::{NameKind, NamingRegistry};
use serde::Serialize;
use std::collections::BTreeMap;

pub const SHARED_BUCKET: &str = "shared";
pub const DEFAULT_BUCKET: &str = "default";

#[derive(Debug, Clone, Serialize)]
pub struct Bucket {
    /// File stem, unique within the plan
    pub name: String,
    /// Grouping key the bucket was opened for
    pub key: String,
    pub shared: bool,
    pub lines: usize,
    pub types: usize,
    /// Operations with at least one declaration here, in order
    pub operations: Vec<String>,
    pub declarations: Vec<GeneratedDeclaration>,
}

impl Bucket {
    fn open(name: String, key: &str, shared: bool) -> Self {
        Self {
            name,
            key: key.to_string(),
            shared,
            lines: 0,
            types: 0,
            operations: Vec::new(),
            declarations: Vec::new(),
        }
    }

    fn add(&mut self, unit: Unit) {
        self.lines += unit.lines;
        self.types += unit.types;
        if let Some(op) = unit.operation {
            self.operations.push(op);
        }
        self.declarations.extend(unit.declarations);
    }

    /// Whether adding `unit` would push any count past its threshold.
    fn would_exceed(&self, unit: &Unit, options: &SplitOptions) -> bool {
        let over = |limit: Option<usize>, value: usize| limit.is_some_and(|max| value > max);
        let ops = self.operations.len() + usize::from(unit.operation.is_some());
        over(options.max_lines, self.lines + unit.lines)
            || over(options.max_types, self.types + unit.types)
            || over(options.max_operations, ops)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SplitPlan {
    pub buckets: Vec<Bucket>,
}

impl SplitPlan {
    pub fn shared(&self) -> Option<&Bucket> {
        self.buckets.iter().find(|b| b.shared)
    }

    pub fn operation_count(&self) -> usize {
        self.buckets.iter().map(|b| b.operations.len()).sum()
    }

    pub fn type_count(&self) -> usize {
        self.buckets.iter().map(|b| b.types).sum()
    }

    pub fn declaration_count(&self) -> usize {
        self.buckets.iter().map(|b| b.declarations.len()).sum()
    }
}

/// All declarations of one operation; never split across buckets.
struct Unit {
    operation: Option<String>,
    lines: usize,
    types: usize,
    declarations: Vec<GeneratedDeclaration>,
}

impl Unit {
    fn new(operation: Option<String>, mut declarations: Vec<GeneratedDeclaration>) -> Self {
        declarations.sort_by(|a, b| a.name.cmp(&b.name).then(a.section.cmp(&b.section)));
        Self {
            operation,
            lines: declarations.iter().map(GeneratedDeclaration::estimated_lines).sum(),
            types: declarations.iter().filter(|d| d.kind == DeclKind::Type).count(),
            declarations,
        }
    }
}

fn group_key(origin: &Origin, strategy: SplitStrategy) -> Option<String> {
    let Origin::Operation(op) = origin else {
        return None;
    };
    let key = match strategy {
        SplitStrategy::Tag => op.tag.clone().or_else(|| op.path_prefix.clone()),
        SplitStrategy::Path => op.path_prefix.clone(),
        SplitStrategy::Single => None,
    };
    Some(key.unwrap_or_else(|| DEFAULT_BUCKET.to_string()))
}

/// Plan the output files for `declarations`.
pub fn plan(
    declarations: Vec<GeneratedDeclaration>,
    options: &SplitOptions,
    names: &mut NamingRegistry,
) -> SplitPlan {
    let mut shared = Vec::new();
    // key -> operation -> declarations, both ordered by name
    let mut groups: BTreeMap<String, BTreeMap<String, Vec<GeneratedDeclaration>>> = BTreeMap::new();

    for decl in declarations {
        match (group_key(&decl.origin, options.strategy), decl.operation()) {
            (Some(key), Some(op)) => {
                let op = op.operation.clone();
                groups.entry(key).or_default().entry(op).or_default().push(decl);
            }
            _ => shared.push(decl),
        }
    }

    let mut buckets = Vec::new();
    if !shared.is_empty() {
        let name = names.assign_for("bucket:shared", SHARED_BUCKET, NameKind::File);
        let mut bucket = Bucket::open(name, SHARED_BUCKET, true);
        bucket.add(Unit::new(None, shared));
        buckets.push(bucket);
    }

    for (key, operations) in groups {
        let mut index = 0;
        let mut current: Option<Bucket> = None;
        for (op, decls) in operations {
            let unit = Unit::new(Some(op), decls);
            if let Some(bucket) = &current {
                if !bucket.operations.is_empty() && bucket.would_exceed(&unit, options) {
                    buckets.extend(current.take());
                }
            }
            let bucket = current.get_or_insert_with(|| {
                index += 1;
                let name = names.assign_for(&format!("bucket:{key}:{index}"), &key, NameKind::File);
                Bucket::open(name, &key, false)
            });
            bucket.add(unit);
        }
        buckets.extend(current);
    }

    tracing::debug!(buckets = buckets.len(), "split plan ready");
    SplitPlan { buckets }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declarations::{DeclBody, Literal, Section};
    use crate::operations::OperationRef;

    fn decl(name: &str, op: Option<(&str, Option<&str>, Option<&str>)>) -> GeneratedDeclaration {
        let origin = match op {
            Some((operation, tag, prefix)) => Origin::Operation(OperationRef {
                operation: operation.to_string(),
                tag: tag.map(str::to_string),
                path_prefix: prefix.map(str::to_string),
            }),
            None => Origin::Shared,
        };
        GeneratedDeclaration::new(
            name,
            Section::Router,
            origin,
            DeclBody::Constant {
                value: Literal::Int(1),
            },
        )
    }

    fn pets(n: usize) -> Vec<GeneratedDeclaration> {
        (0..n)
            .map(|i| decl(&format!("handle{i:02}"), Some((&format!("Op{i:02}"), Some("pets"), Some("pets")))))
            .collect()
    }

    #[test]
    fn test_tag_then_prefix_then_default() {
        let decls = vec![
            decl("a", Some(("A", Some("store"), Some("orders")))),
            decl("b", Some(("B", None, Some("users")))),
            decl("c", Some(("C", None, None))),
            decl("Shared", None),
        ];
        let plan = plan(decls, &SplitOptions::default(), &mut NamingRegistry::new());
        let keys: Vec<&str> = plan.buckets.iter().map(|b| b.key.as_str()).collect();
        assert_eq!(keys, vec!["shared", "default", "store", "users"]);
        assert!(plan.buckets[0].shared);
    }

    #[test]
    fn test_operation_threshold() {
        let options = SplitOptions {
            max_operations: Some(2),
            ..SplitOptions::default()
        };
        let plan = plan(pets(5), &options, &mut NamingRegistry::new());
        let sizes: Vec<usize> = plan.buckets.iter().map(|b| b.operations.len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        let names: Vec<&str> = plan.buckets.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["pets", "pets_2", "pets_3"]);
    }

    #[test]
    fn test_first_operation_always_admitted() {
        let options = SplitOptions {
            max_lines: Some(1),
            ..SplitOptions::default()
        };
        let plan = plan(pets(3), &options, &mut NamingRegistry::new());
        assert_eq!(plan.buckets.len(), 3);
        assert!(plan.buckets.iter().all(|b| b.operations.len() == 1));
    }

    #[test]
    fn test_shared_bucket_ignores_thresholds() {
        let options = SplitOptions {
            max_types: Some(0),
            max_lines: Some(0),
            ..SplitOptions::default()
        };
        let shared: Vec<GeneratedDeclaration> = (0..10).map(|i| decl(&format!("S{i}"), None)).collect();
        let plan = plan(shared, &options, &mut NamingRegistry::new());
        assert_eq!(plan.buckets.len(), 1);
        assert_eq!(plan.buckets[0].declarations.len(), 10);
    }

    #[test]
    fn test_single_strategy_and_determinism() {
        let options = SplitOptions {
            strategy: SplitStrategy::Single,
            ..SplitOptions::default()
        };
        let mut shuffled = pets(4);
        shuffled.reverse();
        let a = plan(shuffled, &options, &mut NamingRegistry::new());
        let b = plan(pets(4), &options, &mut NamingRegistry::new());
        assert_eq!(a.buckets.len(), 1);
        assert_eq!(a.buckets[0].key, "default");
        let names = |p: &SplitPlan| -> Vec<String> {
            p.buckets[0].declarations.iter().map(|d| d.name.clone()).collect()
        };
        assert_eq!(names(&a), names(&b));
    }
}
