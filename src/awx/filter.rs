//! Host-focus filter over plain-text playbook output.
//!
//! Keeps the structural skeleton of a run (play/task headers, stats, the
//! recap) while dropping result lines that belong to other hosts.

/// Line classes that always survive outside recap mode.
const STAT_MARKERS: [&str; 5] = ["STATS", "failed=", "ok=", "changed=", "unreachable="];

pub fn focus_host(log: &str, hostname: &str) -> String {
    let host_marker = format!("[{hostname}]");
    let delegate_marker = format!("[{hostname} -> ");
    let skipping_marker = format!("skipping: [{hostname}]");

    let mut out: Vec<&str> = Vec::new();
    let mut recap_mode = false;
    let mut recap_emitted = false;
    let mut carry_over = false;

    for line in log.lines() {
        if recap_mode {
            if is_recap_line(line, hostname) {
                out.push(line);
                continue;
            }
            if is_section_header(line) && !line.starts_with("PLAY RECAP") {
                // A new uppercase section ends the recap; the line itself
                // goes through the normal rules below.
                recap_mode = false;
            } else {
                continue;
            }
        }

        if line.starts_with("PLAY RECAP") {
            recap_mode = true;
            carry_over = false;
            if !recap_emitted {
                push_with_separator(&mut out, line);
                recap_emitted = true;
            }
            continue;
        }

        if line.starts_with("PLAY [")
            || line.starts_with("TASK [")
            || line.starts_with("RUNNING HANDLER")
            || line.contains("INCLUDED TASKS")
        {
            carry_over = false;
            push_with_separator(&mut out, line);
            continue;
        }

        if STAT_MARKERS.iter().any(|marker| line.contains(marker)) {
            carry_over = false;
            out.push(line);
            continue;
        }

        if line.contains(&host_marker) || line.contains(&delegate_marker) {
            out.push(line);
            carry_over = true;
            continue;
        }

        if carry_over {
            let blank = line.trim().is_empty();
            let indented = line.starts_with(' ') || line.starts_with('\t');
            if blank || indented || line.starts_with(&skipping_marker) {
                if !(blank && out.last().is_some_and(|last| last.trim().is_empty())) {
                    out.push(line);
                }
                continue;
            }
            carry_over = false;
        }
    }

    let mut focused = out.join("\n");
    if !focused.is_empty() {
        focused.push('\n');
    }
    focused
}

/// Recap rows start with the host name directly followed by a colon,
/// optionally padded (`alpha    : ok=1 ...`).
fn is_recap_line(line: &str, hostname: &str) -> bool {
    line.strip_prefix(hostname)
        .is_some_and(|rest| rest.trim_start().starts_with(':'))
}

/// Uppercase section headers (`PLAY …`, `TASK …`) delimit playbook phases.
fn is_section_header(line: &str) -> bool {
    line.chars()
        .take_while(|c| c.is_ascii_uppercase())
        .count()
        >= 2
}

/// Keeps one blank separator between emitted task blocks.
fn push_with_separator<'a>(out: &mut Vec<&'a str>, line: &'a str) {
    if let Some(last) = out.last() {
        if !last.trim().is_empty() {
            out.push("");
        }
    }
    out.push(line);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_structure_and_own_host_only() {
        let log = "PLAY [all]\nTASK [install]\nok: [alpha]\nok: [beta]\nPLAY RECAP\nalpha: ok=1\nbeta: ok=1\n";
        let focused = focus_host(log, "alpha");

        assert!(focused.contains("PLAY [all]"));
        assert!(focused.contains("TASK [install]"));
        assert!(focused.contains("ok: [alpha]"));
        assert!(focused.contains("PLAY RECAP"));
        assert!(focused.contains("alpha: ok=1"));
        assert!(!focused.contains("ok: [beta]"));
        assert!(!focused.contains("beta: ok=1"));
        assert_eq!(focused.matches("PLAY RECAP").count(), 1);
    }

    #[test]
    fn carry_over_keeps_continuations_and_skips() {
        let log = concat!(
            "TASK [configure]\n",
            "changed: [alpha] => {\n",
            "    \"path\": \"/etc/mono\"\n",
            "}\n",
            "skipping: [alpha] => (item=optional)\n",
            "changed: [beta] => {\n",
            "    \"path\": \"/etc/mono\"\n",
            "}\n",
        );
        let focused = focus_host(log, "alpha");
        assert!(focused.contains("changed: [alpha] => {"));
        assert!(focused.contains("    \"path\": \"/etc/mono\""));
        assert!(focused.contains("skipping: [alpha]"));
        assert!(!focused.contains("changed: [beta]"));
        // beta's continuation block is dropped with it
        assert_eq!(focused.matches("\"path\"").count(), 1);
    }

    #[test]
    fn delegated_task_lines_survive() {
        let log = "TASK [dns]\nok: [alpha -> ns1.example.com]\nok: [beta -> ns1.example.com]\n";
        let focused = focus_host(log, "alpha");
        assert!(focused.contains("ok: [alpha -> ns1.example.com]"));
        assert!(!focused.contains("[beta ->"));
    }

    #[test]
    fn recap_padding_and_prefix_hosts() {
        let log = concat!(
            "PLAY RECAP *********\n",
            "alpha                      : ok=3    changed=1    unreachable=0    failed=0\n",
            "alpha-db                   : ok=2    changed=0    unreachable=0    failed=0\n",
        );
        let focused = focus_host(log, "alpha");
        assert!(focused.contains("alpha                      : ok=3"));
        // `alpha-db` begins with `alpha` but is a different host.
        assert!(!focused.contains("alpha-db"));
    }

    #[test]
    fn new_section_after_recap_exits_recap_mode() {
        let log = concat!(
            "PLAY RECAP\n",
            "alpha: ok=1\n",
            "beta: ok=1\n",
            "PLAY [cleanup]\n",
            "ok: [beta]\n",
            "ok: [alpha]\n",
        );
        let focused = focus_host(log, "alpha");
        assert!(focused.contains("PLAY [cleanup]"));
        assert!(focused.contains("ok: [alpha]"));
        assert!(!focused.contains("ok: [beta]"));
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(focus_host("", "alpha"), "");
    }
}
