// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Print rules and replay caches in a human-friendly manner.
//!
//! This is mostly just a place to hang printing routines so that they
//! can be used by both ofpipeadm and integration tests.

use crate::api::DumpCacheResp;
use crate::api::RuleDump;
use std::io::Write;
use tabwriter::TabWriter;

/// Print a [`DumpCacheResp`].
pub fn print_cache(resp: &DumpCacheResp) -> std::io::Result<()> {
    print_cache_into(&mut std::io::stdout(), resp)
}

/// Print a [`DumpCacheResp`] into a given writer.
pub fn print_cache_into(
    writer: &mut impl Write,
    resp: &DumpCacheResp,
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);

    writeln!(
        t,
        "Feature {} ({} keys, {} rules)",
        resp.feature,
        resp.entries.len(),
        resp.num_rules()
    )?;
    write_hrb(&mut t)?;

    for entry in &resp.entries {
        writeln!(t, "\n{}", entry.key)?;
        write_hr(&mut t)?;
        print_rule_header(&mut t)?;
        for rule in &entry.rules {
            print_rule(&mut t, rule)?;
        }
        t.flush()?;
    }

    writeln!(t)?;
    t.flush()
}

/// Print a list of rules, such as those held by an installer.
pub fn print_rules_into(
    writer: &mut impl Write,
    rules: &[RuleDump],
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);
    print_rule_header(&mut t)?;
    for rule in rules {
        print_rule(&mut t, rule)?;
    }
    t.flush()
}

/// Print the header for the [`print_rule()`] output.
pub fn print_rule_header(t: &mut impl Write) -> std::io::Result<()> {
    writeln!(t, "TABLE\tPRI\tCOOKIE\tMATCHES\tACTIONS")
}

/// Print a [`RuleDump`].
pub fn print_rule(t: &mut impl Write, rule: &RuleDump) -> std::io::Result<()> {
    let matches = if rule.matches.is_empty() {
        "*".to_string()
    } else {
        rule.matches.join(",")
    };

    writeln!(
        t,
        "{}({})\t{}\t{:#x}\t{}\t{}",
        rule.table,
        rule.table_id,
        rule.priority,
        rule.cookie,
        matches,
        rule.actions.join(","),
    )
}

/// Output a horizontal rule in bold to the given writer.
pub fn write_hrb(t: &mut impl Write) -> std::io::Result<()> {
    writeln!(t, "{:=<70}", "=")
}

/// Output a horizontal rule to the given writer.
pub fn write_hr(t: &mut impl Write) -> std::io::Result<()> {
    writeln!(t, "{:-<70}", "-")
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::api::CacheEntryDump;

    fn dump() -> RuleDump {
        RuleDump {
            table: "Output".into(),
            table_id: 90,
            priority: 210,
            cookie: 0x1090000000003,
            category: "Multicluster".into(),
            matches: vec!["reg1=0x7".into(), "in_port=7".into()],
            actions: vec!["IN_PORT".into()],
        }
    }

    #[test]
    fn cache_output() {
        let resp = DumpCacheResp {
            feature: "Multicluster".into(),
            entries: vec![CacheEntryDump {
                key: "multicluster-classifier".into(),
                rules: vec![dump()],
            }],
        };

        let mut out = vec![];
        print_cache_into(&mut out, &resp).unwrap();
        let out = String::from_utf8(out).unwrap();

        assert!(out.starts_with("Feature Multicluster (1 keys, 1 rules)\n"));
        assert!(out.contains("multicluster-classifier"));
        assert!(out.contains("reg1=0x7,in_port=7"));
        assert!(out.contains("0x1090000000003"));
    }

    #[test]
    fn rules_output_aligns() {
        let mut out = vec![];
        print_rules_into(&mut out, &[dump()]).unwrap();
        let out = String::from_utf8(out).unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("TABLE"));
        assert_eq!(lines[0].find("PRI"), lines[1].find("210"));
    }
}
