//! Template assets: type lookup, stylesheet inlining and placeholder filling

use std::collections::{BTreeMap, HashMap};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::record::CertificateRecord;
use crate::{Error, Result};

/// Slot for the QR image source.
pub const QR_CODE_SLOT: &str = "qrCode";
/// Slot for the identifier printed on the certificate.
pub const CERTIFICATE_ID_SLOT: &str = "certificateId";
/// Slot for the ledger transaction identifier.
pub const TRANSACTION_ID_SLOT: &str = "transactionId";

/// Single owner of the certificate type -> template file table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateRegistry {
    files: BTreeMap<String, String>,
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        let files = [
            ("Degree Certificate", "degree.html"),
            ("Bonafide Certificate", "bonafide.html"),
            ("Transfer Certificate", "transfer.html"),
            ("Project Completion Certificate", "project_completion.html"),
            ("NOC (No Objection Certificate)", "noc.html"),
            ("Participation Certificate", "participation.html"),
            ("Achievement Certificate", "achievement.html"),
        ]
        .into_iter()
        .map(|(ty, file)| (ty.to_string(), file.to_string()))
        .collect();
        Self { files }
    }
}

impl TemplateRegistry {
    pub fn empty() -> Self {
        Self {
            files: BTreeMap::new(),
        }
    }

    /// Template file for a certificate type.
    pub fn resolve(&self, certificate_type: &str) -> Result<&str> {
        self.files
            .get(certificate_type)
            .map(String::as_str)
            .ok_or_else(|| Error::TemplateNotFound(certificate_type.to_string()))
    }

    pub fn insert(&mut self, certificate_type: impl Into<String>, file: impl Into<String>) {
        self.files.insert(certificate_type.into(), file.into());
    }

    /// Known certificate types, sorted.
    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files.iter().map(|(t, f)| (t.as_str(), f.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Replace the template's stylesheet reference with an embedded style block.
///
/// Templates that lack the reference get the block appended to `<head>` (or
/// prepended when there is no head) so the styles still apply.
pub fn inline_stylesheet(html: &str, link: &str, css: &str) -> String {
    let block = format!("<style>{}</style>", css);
    if html.contains(link) {
        return html.replacen(link, &block, 1);
    }
    debug!("stylesheet reference not found in template; injecting style block");
    match html.find("</head>") {
        Some(pos) => {
            let mut out = String::with_capacity(html.len() + block.len());
            out.push_str(&html[..pos]);
            out.push_str(&block);
            out.push_str(&html[pos..]);
            out
        }
        None => format!("{}{}", block, html),
    }
}

/// Values substituted for the reserved slots.
#[derive(Debug, Clone)]
pub struct ReservedSlots {
    pub qr_code: String,
    pub certificate_id: String,
    pub transaction_id: String,
}

impl ReservedSlots {
    /// Identifier slots fall back to the request id and `N/A` without a hash.
    pub fn for_record(record: &CertificateRecord, request_id: &str, qr_code: String) -> Self {
        let hash = record.content_hash();
        Self {
            qr_code,
            certificate_id: hash.unwrap_or(request_id).to_string(),
            transaction_id: hash.unwrap_or("N/A").to_string(),
        }
    }
}

/// Fill a certificate template from a record and the reserved slots.
pub fn fill_certificate(template: &str, record: &CertificateRecord, slots: &ReservedSlots) -> String {
    let mut values: HashMap<&str, String> = record.bindings().into_iter().collect();
    values.insert(QR_CODE_SLOT, slots.qr_code.clone());
    values.insert(CERTIFICATE_ID_SLOT, slots.certificate_id.clone());
    values.insert(TRANSACTION_ID_SLOT, slots.transaction_id.clone());
    substitute(template, |key| values.get(key).map(String::as_str))
}

/// Replace every `{{key}}` for which `lookup` has a value, in one left-to-right pass.
///
/// Keys are matched literally. Substituted values are HTML-escaped and never
/// rescanned. Tokens `lookup` does not know are copied through untouched.
pub fn substitute<'v, F>(template: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<&'v str>,
{
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];
        match after_open.find("}}") {
            Some(close) => match lookup(&after_open[..close]) {
                Some(value) => {
                    escape_html_into(value, &mut out);
                    rest = &after_open[close + 2..];
                }
                None => {
                    out.push_str("{{");
                    rest = after_open;
                }
            },
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn escape_html_into(value: &str, out: &mut String) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slots() -> ReservedSlots {
        ReservedSlots {
            qr_code: "data:image/png;base64,AAAA".into(),
            certificate_id: "abc123".into(),
            transaction_id: "abc123".into(),
        }
    }

    #[test]
    fn every_mapped_type_resolves() {
        let registry = TemplateRegistry::default();
        assert_eq!(registry.types().count(), 7);
        for (ty, file) in registry.iter() {
            assert_eq!(registry.resolve(ty).unwrap(), file);
        }
    }

    #[test]
    fn unmapped_type_is_template_not_found() {
        let err = TemplateRegistry::default().resolve("Marksheet").unwrap_err();
        assert!(matches!(err, Error::TemplateNotFound(ref t) if t == "Marksheet"));
    }

    #[test]
    fn stylesheet_link_is_replaced_once() {
        let link = r#"<link rel="stylesheet" href="styles.css">"#;
        let html = format!("<html><head>{}</head><body></body></html>", link);
        let out = inline_stylesheet(&html, link, "h1{color:red}");
        assert_eq!(out, "<html><head><style>h1{color:red}</style></head><body></body></html>");
    }

    #[test]
    fn missing_stylesheet_link_injects_into_head() {
        let out = inline_stylesheet("<html><head></head></html>", "<link>", "p{}");
        assert_eq!(out, "<html><head><style>p{}</style></head></html>");
        assert_eq!(inline_stylesheet("<div></div>", "<link>", "p{}"), "<style>p{}</style><div></div>");
    }

    #[test]
    fn substitution_replaces_every_occurrence() {
        let record = CertificateRecord {
            student_name: Some("Asha Rao".into()),
            ..Default::default()
        };
        let out = fill_certificate(
            "{{student_name}} / {{student_name}} / {{description}}|",
            &record,
            &slots(),
        );
        assert_eq!(out, "Asha Rao / Asha Rao / |");
    }

    #[test]
    fn unknown_placeholders_are_left_literal() {
        let out = fill_certificate("{{ student_name }} {{unknown}} {{qrCode}}", &Default::default(), &slots());
        assert_eq!(out, "{{ student_name }} {{unknown}} data:image/png;base64,AAAA");
    }

    #[test]
    fn template_without_record_keys_only_changes_reserved_slots() {
        let template = "<p>Static text {{notAKey}} and {braces}</p><img src=\"{{qrCode}}\"><span>{{certificateId}}</span>";
        let out = fill_certificate(template, &Default::default(), &slots());
        let expected = template
            .replace("{{qrCode}}", "data:image/png;base64,AAAA")
            .replace("{{certificateId}}", "abc123");
        assert_eq!(out, expected);
    }

    #[test]
    fn values_are_not_rescanned_and_are_escaped() {
        let record = CertificateRecord {
            student_name: Some("{{institute_name}}".into()),
            institute_name: Some("A & B <Institute>".into()),
            ..Default::default()
        };
        let out = fill_certificate("{{student_name}}|{{institute_name}}", &record, &slots());
        assert_eq!(out, "{{institute_name}}|A &amp; B &lt;Institute&gt;");
    }

    #[test]
    fn unterminated_and_nested_braces() {
        let lookup = |k: &str| if k == "a" { Some("x") } else { None };
        assert_eq!(substitute("{{{{a}}", lookup), "{{x");
        assert_eq!(substitute("tail {{a", lookup), "tail {{a");
        assert_eq!(substitute("{{a}}{{a}}", lookup), "xx");
    }

    #[test]
    fn reserved_slots_fall_back_without_hash() {
        let slots = ReservedSlots::for_record(&CertificateRecord::default(), "42", "qr".into());
        assert_eq!(slots.certificate_id, "42");
        assert_eq!(slots.transaction_id, "N/A");
    }
}
