use crate::error::MigrateError;
use crate::types::{Record, RRSet, Zone};

/// Which optional sanitizer behaviors are turned on. Off by default,
/// matching the CLI flags in spec.md §6.
#[derive(Debug, Clone, Copy, Default)]
pub struct SanitizeOptions {
    pub normalize_txt_escapes: bool,
    pub auto_fix_cname_conflicts: bool,
    pub auto_fix_double_cname_conflicts: bool,
}

/// Transforms a raw server-returned zone document into canonical form:
/// strips read-only fields, normalizes names and record content, and
/// applies the configured auto-fix passes. Pure: no I/O, no suspension.
///
/// Idempotent: `sanitize(sanitize(z, o), o) == sanitize(z, o)`.
pub fn sanitize(mut zone: Zone, opts: &SanitizeOptions) -> Result<Zone, MigrateError> {
    // Step 1: drop top-level read-only fields.
    zone.id = None;
    zone.url = None;
    zone.serial = None;
    zone.notified_serial = None;
    zone.edited_serial = None;
    zone.api_rectify = None;
    zone.presigned = None;
    zone.last_check = None;
    zone.zone = None;
    // DNSSEC-only fields: treated as read-only and dropped per the Open
    // Question in the spec. Active signing configuration, if any, lives
    // server-side and is never reconstructed here; this repo does not
    // manage DNSSEC key material.
    zone.nsec3param = None;
    zone.nsec3narrow = None;
    zone.dnssec = None;

    // Step 2: zone name gets a trailing dot; comparisons elsewhere
    // lower-case it, but the stored value preserves server form.
    if !zone.name.ends_with('.') {
        zone.name.push('.');
    }

    // Step 3: per-RRSet normalization.
    for rrset in &mut zone.rrsets {
        if !rrset.name.ends_with('.') {
            rrset.name.push('.');
        }
        rrset.rrset_type = rrset.rrset_type.to_ascii_uppercase();
    }

    // Step 4: TXT/SPF escape normalization, opt-in.
    if opts.normalize_txt_escapes {
        for rrset in &mut zone.rrsets {
            if rrset.rrset_type == "TXT" || rrset.rrset_type == "SPF" {
                for record in &mut rrset.records {
                    record.content = normalize_txt_content(&record.content);
                }
            }
        }
    }

    // Step 5: CNAME-conflict repair, two independent opt-in flags. With
    // auto-fix off, a residual CNAME/other-type conflict at the same owner
    // is a structural impossibility, not something the diff/upload layer
    // should ever see: it surfaces as a ValidationError instead.
    if opts.auto_fix_cname_conflicts {
        fix_cname_conflicts(&mut zone);
    } else {
        validate_no_cname_conflicts(&zone)?;
    }
    if opts.auto_fix_double_cname_conflicts {
        fix_double_cname_conflicts(&mut zone);
    }

    // Step 6: canonical sort by (name, type), then validate uniqueness.
    zone.rrsets
        .sort_by(|a, b| a.key().cmp(&b.key()));

    let mut seen = std::collections::HashSet::new();
    for rrset in &zone.rrsets {
        if !seen.insert(rrset.key()) {
            return Err(MigrateError::Validation(format!(
                "duplicate rrset for {} {}",
                rrset.name, rrset.rrset_type
            )));
        }
    }

    Ok(zone)
}

/// Owner names (lower-cased) that carry a `CNAME` RRSet alongside at least
/// one other RRSet type. Shared by the auto-fix pass and by the
/// auto-fix-off validation check below.
fn cname_conflicted_owners(zone: &Zone) -> std::collections::HashSet<String> {
    let mut by_owner: std::collections::HashMap<String, Vec<&str>> = std::collections::HashMap::new();
    for rrset in &zone.rrsets {
        by_owner
            .entry(rrset.name.to_ascii_lowercase())
            .or_default()
            .push(rrset.rrset_type.as_str());
    }
    by_owner
        .into_iter()
        .filter(|(_, types)| types.contains(&"CNAME") && types.iter().any(|t| *t != "CNAME"))
        .map(|(owner, _)| owner)
        .collect()
}

/// Drops the CNAME at the apex (keeping other types), or drops every
/// non-CNAME RRSet at a non-apex owner that also has a CNAME.
fn fix_cname_conflicts(zone: &mut Zone) {
    let apex = zone.name.to_ascii_lowercase();
    let conflicted_owners = cname_conflicted_owners(zone);

    if conflicted_owners.is_empty() {
        return;
    }

    zone.rrsets.retain(|rrset| {
        let owner = rrset.name.to_ascii_lowercase();
        if !conflicted_owners.contains(&owner) {
            return true;
        }
        if owner == apex {
            // apex: drop the CNAME, keep everything else
            rrset.rrset_type != "CNAME"
        } else {
            // non-apex: drop everything except the CNAME
            rrset.rrset_type == "CNAME"
        }
    });
}

/// With `auto_fix_cname_conflicts` off, any owner carrying a CNAME
/// alongside another RRSet type is a structural impossibility rather than
/// something the diff/upload layer should reconcile.
fn validate_no_cname_conflicts(zone: &Zone) -> Result<(), MigrateError> {
    if let Some(owner) = cname_conflicted_owners(zone).into_iter().next() {
        return Err(MigrateError::Validation(format!(
            "cname conflict at {owner}: CNAME cannot coexist with another rrset type (pass --auto-fix-cname-conflicts to repair)"
        )));
    }
    Ok(())
}

/// Trims any CNAME RRSet with more than one record down to its first,
/// preserving source order.
fn fix_double_cname_conflicts(zone: &mut Zone) {
    for rrset in &mut zone.rrsets {
        if rrset.rrset_type == "CNAME" && rrset.records.len() > 1 {
            rrset.records.truncate(1);
        }
    }
}

/// Decodes a 3-digit escape triplet into a byte. Backends disagree on
/// whether `\NNN` triplets are decimal or octal (PowerDNS's own backends
/// have emitted both for the same byte); a triplet that isn't a valid
/// decimal byte value (> 255) is retried as octal before giving up, so
/// e.g. `\357` (invalid decimal) and `\239` (its decimal equivalent) both
/// decode to the same byte.
fn decode_escape_triplet(triplet: &str) -> Option<u8> {
    if let Ok(n) = triplet.parse::<u16>() {
        if n <= 255 {
            return Some(n as u8);
        }
    }
    if triplet.chars().all(|c| ('0'..='7').contains(&c)) {
        let digits: Vec<u16> = triplet.chars().map(|c| c.to_digit(8).unwrap() as u16).collect();
        let value = digits[0] * 64 + digits[1] * 8 + digits[2];
        if value <= 255 {
            return Some(value as u8);
        }
    }
    None
}

/// Decodes `\NNN` escape triplets (decimal, falling back to octal when the
/// decimal value would be out of range) into raw bytes and re-serializes
/// using the canonical double-quoted form PowerDNS uses for TXT content, so
/// that two semantically identical TXT records coming from different
/// backends compare equal.
fn normalize_txt_content(content: &str) -> String {
    let inner = content
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(content);

    let mut bytes = Vec::with_capacity(inner.len());
    let chars: Vec<char> = inner.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '\\' && i + 3 < chars.len() && chars[i + 1..i + 4].iter().all(|c| c.is_ascii_digit())
        {
            let triplet: String = chars[i + 1..i + 4].iter().collect();
            if let Some(byte) = decode_escape_triplet(&triplet) {
                bytes.push(byte);
                i += 4;
                continue;
            }
            bytes.push(chars[i] as u8);
            i += 1;
        } else {
            let mut buf = [0u8; 4];
            let s = chars[i].encode_utf8(&mut buf);
            bytes.extend_from_slice(s.as_bytes());
            i += 1;
        }
    }

    let decoded = String::from_utf8_lossy(&bytes).into_owned();
    quote_txt(&decoded)
}

/// Re-quote decoded TXT content the way PowerDNS serializes it: wrapped in
/// double quotes, with embedded quotes and backslashes escaped.
fn quote_txt(decoded: &str) -> String {
    let mut out = String::with_capacity(decoded.len() + 2);
    out.push('"');
    for c in decoded.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

/// Builds an RRSet with already-sorted `records`/`comments` used by test
/// helpers elsewhere; kept private to this module's test suite.
#[cfg(test)]
fn rrset(name: &str, ty: &str, ttl: u32, records: Vec<Record>) -> RRSet {
    RRSet {
        name: name.to_string(),
        rrset_type: ty.to_string(),
        ttl,
        records,
        comments: vec![],
    }
}
