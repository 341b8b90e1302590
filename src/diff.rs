use std::collections::HashMap;

use crate::types::{Change, Comment, Record, RRSet};

/// Equivalence knobs for RRSet comparison. Currently just SOA-serial
/// drift; more may be added without breaking the diff algorithm's shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffOptions {
    pub ignore_soa_serial: bool,
}

/// Computes the minimal set of RRSet mutations that would make `target`
/// equal to `source` under the configured equivalence. Both slices are
/// assumed already sanitized (sorted by `(name, type)`, no duplicate keys).
///
/// Output order: all `Replace`s (sorted by key) before all `Delete`s
/// (sorted by key), per spec — this minimizes transient conflicts on the
/// server when a replace of one name must land before a delete of its
/// sibling.
pub fn diff(source: &[RRSet], target: &[RRSet], opts: &DiffOptions) -> Vec<Change> {
    let source_by_key: HashMap<(String, String), &RRSet> =
        source.iter().map(|r| (r.key(), r)).collect();
    let target_by_key: HashMap<(String, String), &RRSet> =
        target.iter().map(|r| (r.key(), r)).collect();

    let mut replaces: Vec<(&(String, String), Change)> = Vec::new();
    let mut deletes: Vec<&(String, String)> = Vec::new();

    for (key, src_rrset) in &source_by_key {
        match target_by_key.get(key) {
            None => {
                replaces.push((key, Change::replace(src_rrset)));
            }
            Some(tgt_rrset) => {
                if !equivalent(src_rrset, tgt_rrset, opts) {
                    replaces.push((key, Change::replace(src_rrset)));
                }
            }
        }
    }

    for key in target_by_key.keys() {
        if !source_by_key.contains_key(key) {
            deletes.push(key);
        }
    }

    replaces.sort_by(|a, b| a.0.cmp(b.0));
    deletes.sort();

    let mut changes: Vec<Change> = replaces.into_iter().map(|(_, c)| c).collect();
    changes.extend(
        deletes
            .into_iter()
            .map(|(name, ty)| Change::delete(name, ty)),
    );
    changes
}

/// Two RRSets are equivalent iff `ttl` matches, `records` match as a
/// multiset of `(content, disabled)`, and `comments` match as a multiset
/// (ignoring `modified_at`, per the Open Question). Under
/// `ignore_soa_serial`, SOA comparison substitutes the target's serial
/// into the source's SOA content before comparing, so the target's own
/// serial survives unless something else in the record actually changed.
fn equivalent(source: &RRSet, target: &RRSet, opts: &DiffOptions) -> bool {
    if source.ttl != target.ttl {
        return false;
    }

    if opts.ignore_soa_serial && source.rrset_type == "SOA" {
        let adjusted_source: Vec<Record> = source
            .records
            .iter()
            .map(|r| Record::new(splice_soa_serial(&r.content, &target.records), r.disabled))
            .collect();
        if !multiset_eq(&adjusted_source, &target.records, record_key) {
            return false;
        }
    } else if !multiset_eq(&source.records, &target.records, record_key) {
        return false;
    }

    multiset_eq(&source.comments, &target.comments, comment_key)
}

fn record_key(r: &Record) -> (String, bool) {
    (r.content.clone(), r.disabled)
}

fn comment_key(c: &Comment) -> (String, String) {
    (c.content.clone(), c.account.clone())
}

fn multiset_eq<T, K: Eq + std::hash::Hash>(a: &[T], b: &[T], key: impl Fn(&T) -> K) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut counts: HashMap<K, i64> = HashMap::new();
    for item in a {
        *counts.entry(key(item)).or_insert(0) += 1;
    }
    for item in b {
        *counts.entry(key(item)).or_insert(0) -= 1;
    }
    counts.values().all(|&c| c == 0)
}

/// Replaces the serial field (the second whitespace-separated token) of a
/// SOA record's content with the one from `target_records`'s first entry,
/// so that subsequent comparison treats serial drift as a non-difference.
fn splice_soa_serial(source_content: &str, target_records: &[Record]) -> String {
    let target_serial = target_records
        .first()
        .and_then(|r| r.content.split_whitespace().nth(2));
    let Some(target_serial) = target_serial else {
        return source_content.to_string();
    };
    let mut fields: Vec<&str> = source_content.split_whitespace().collect();
    if fields.len() > 2 {
        fields[2] = target_serial;
    }
    fields.join(" ")
}
