use std::fmt::Write as _;

use crate::api::export::ExportedReport;
use crate::api::traits::Exporter;
use crate::api::types::RunError;

/// XML report. Attribute values and element text share one escaper covering
/// `& < > " '`.
pub struct XmlExporter;

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

impl Exporter for XmlExporter {
    fn file_name(&self) -> &str {
        "shamash-report.xml"
    }

    fn render(&self, report: &ExportedReport) -> Result<Vec<u8>, RunError> {
        let mut xml = String::new();
        xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        let _ = writeln!(
            xml,
            "<shamashReport version=\"{}\" tool=\"{}\" toolVersion=\"{}\" generatedAt=\"{}\">",
            report.version,
            escape(&report.tool),
            escape(&report.tool_version),
            escape(&report.generated_at),
        );
        let s = &report.summary;
        let _ = writeln!(
            xml,
            "  <summary classes=\"{}\" methods=\"{}\" fields=\"{}\" edges=\"{}\" errors=\"{}\" warnings=\"{}\" infos=\"{}\"/>",
            s.classes,
            s.methods,
            s.fields,
            s.edges,
            s.findings_by_severity[0],
            s.findings_by_severity[1],
            s.findings_by_severity[2],
        );
        xml.push_str("  <findings>\n");
        for f in &report.findings {
            let _ = write!(
                xml,
                "    <finding ruleId=\"{}\" severity=\"{}\" filePath=\"{}\"",
                escape(&f.rule_id),
                escape(f.severity.canonical_name()),
                escape(&f.file_path),
            );
            if !f.class_fqn.is_empty() {
                let _ = write!(xml, " class=\"{}\"", escape(&f.class_fqn));
            }
            if !f.member.is_empty() {
                let _ = write!(xml, " member=\"{}\"", escape(&f.member));
            }
            if let Some(start) = f.start {
                let _ = write!(xml, " start=\"{}\"", start);
            }
            if let Some(end) = f.end {
                let _ = write!(xml, " end=\"{}\"", end);
            }
            let _ = writeln!(xml, " fingerprint=\"{}\">", escape(&f.fingerprint));
            let _ = writeln!(xml, "      <message>{}</message>", escape(&f.message));
            if !f.data.is_empty() {
                xml.push_str("      <data>\n");
                for (key, value) in &f.data {
                    let _ = writeln!(
                        xml,
                        "        <entry key=\"{}\">{}</entry>",
                        escape(key),
                        escape(value),
                    );
                }
                xml.push_str("      </data>\n");
            }
            xml.push_str("    </finding>\n");
        }
        xml.push_str("  </findings>\n");
        if !report.errors.is_empty() {
            xml.push_str("  <engineErrors>\n");
            for error in &report.errors {
                let _ = write!(xml, "    <engineError phase=\"{}\"", escape(&error.phase));
                if let Some(rule_id) = &error.rule_id {
                    let _ = write!(xml, " ruleId=\"{}\"", escape(rule_id.as_str()));
                }
                let _ = writeln!(xml, ">{}</engineError>", escape(&error.message));
            }
            xml.push_str("  </engineErrors>\n");
        }
        xml.push_str("</shamashReport>\n");
        Ok(xml.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::export::ExportedFinding;
    use crate::api::types::{EngineSummary, Severity};
    use indexmap::IndexMap;

    #[test]
    fn test_escape_all_five() {
        assert_eq!(escape("a&b<c>d\"e'f"), "a&amp;b&lt;c&gt;d&quot;e&apos;f");
    }

    #[test]
    fn test_render_escapes_attributes_and_text() {
        let mut data = IndexMap::new();
        data.insert("expr".to_string(), "a < b && c".to_string());
        let report = ExportedReport {
            version: 1,
            tool: "shamash".to_string(),
            tool_version: "0.1.0".to_string(),
            generated_at: "2026-01-15T12:00:00Z".to_string(),
            project_root: "/w".to_string(),
            summary: EngineSummary::default(),
            findings: vec![ExportedFinding {
                rule_id: "a.b".to_string(),
                severity: Severity::Error,
                message: "uses \"<init>\" & more".to_string(),
                file_path: "out/A.class".to_string(),
                class_fqn: "A".to_string(),
                member: "<init>".to_string(),
                start: None,
                end: None,
                fingerprint: "ff".repeat(32),
                data,
            }],
            errors: vec![],
        };
        let text = String::from_utf8(XmlExporter.render(&report).unwrap()).unwrap();
        assert!(text.contains("member=\"&lt;init&gt;\""));
        assert!(text.contains("uses &quot;&lt;init&gt;&quot; &amp; more"));
        assert!(text.contains("a &lt; b &amp;&amp; c"));
        assert!(!text.contains("<init>"));
    }
}
