//! Certificate records as returned by the backend
//!
//! The record is bound to template slots through a fixed schema: only the
//! fields listed in [`CertificateRecord::FIELDS`] are ever substituted, so a
//! change in the backend's JSON shape cannot leak unexpected values into a
//! certificate.

use serde::{Deserialize, Serialize};

/// The field set describing one approved certificate request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificateRecord {
    pub student_name: Option<String>,
    pub student_username: Option<String>,
    pub institute_name: Option<String>,
    pub institute_username: Option<String>,
    pub template_name: Option<String>,
    pub template_type: Option<String>,
    pub request_date: Option<String>,
    pub certificate_hash: Option<String>,
    pub description: Option<String>,
}

/// A placeholder key paired with the value it is replaced by.
pub type Binding = (&'static str, String);

impl CertificateRecord {
    /// Placeholder keys bound from the record, in schema order.
    pub const FIELDS: [&'static str; 9] = [
        "student_name",
        "student_username",
        "institute_name",
        "institute_username",
        "template_name",
        "template_type",
        "request_date",
        "certificate_hash",
        "description",
    ];

    /// Fill absent display names from the login identifiers. Empty and
    /// whitespace-only names count as absent.
    pub fn normalize_display_names(&mut self) {
        if is_blank(&self.student_name) {
            if let Some(username) = self.student_username.clone().filter(|u| !u.trim().is_empty()) {
                self.student_name = Some(username);
            }
        }
        if is_blank(&self.institute_name) {
            if let Some(username) = self.institute_username.clone().filter(|u| !u.trim().is_empty()) {
                self.institute_name = Some(username);
            }
        }
    }

    /// Value for every schema field; absent values bind to the empty string.
    pub fn bindings(&self) -> Vec<Binding> {
        let fields = [
            &self.student_name,
            &self.student_username,
            &self.institute_name,
            &self.institute_username,
            &self.template_name,
            &self.template_type,
            &self.request_date,
            &self.certificate_hash,
            &self.description,
        ];
        Self::FIELDS
            .iter()
            .zip(fields)
            .map(|(key, value)| (*key, value.clone().unwrap_or_default()))
            .collect()
    }

    /// Content hash, if the backend issued a non-empty one.
    pub fn content_hash(&self) -> Option<&str> {
        self.certificate_hash
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
    }

    pub fn certificate_type(&self) -> &str {
        self.template_type.as_deref().unwrap_or_default()
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(|v| v.trim().is_empty()).unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_names_fall_back_to_usernames() {
        let mut record: CertificateRecord = serde_json::from_value(serde_json::json!({
            "student_name": null,
            "student_username": "jdoe",
            "institute_name": "",
            "institute_username": "abc-inst",
            "template_type": "Bonafide Certificate",
            "unexpected_key": "ignored"
        }))
        .expect("record");
        record.normalize_display_names();
        assert_eq!(record.student_name.as_deref(), Some("jdoe"));
        assert_eq!(record.institute_name.as_deref(), Some("abc-inst"));
    }

    #[test]
    fn whitespace_only_names_fall_back_too() {
        let mut record = CertificateRecord {
            student_name: Some("   ".into()),
            student_username: Some("jdoe".into()),
            institute_name: Some("\t".into()),
            institute_username: Some(" ".into()),
            ..Default::default()
        };
        record.normalize_display_names();
        assert_eq!(record.student_name.as_deref(), Some("jdoe"));
        // A blank username is no better, so the blank name stays.
        assert_eq!(record.institute_name.as_deref(), Some("\t"));
    }

    #[test]
    fn present_names_are_kept() {
        let mut record = CertificateRecord {
            student_name: Some("Asha Rao".into()),
            student_username: Some("asha".into()),
            ..Default::default()
        };
        record.normalize_display_names();
        assert_eq!(record.student_name.as_deref(), Some("Asha Rao"));
        assert_eq!(record.institute_name, None);
    }

    #[test]
    fn bindings_cover_schema_with_empty_defaults() {
        let record = CertificateRecord {
            template_type: Some("NOC (No Objection Certificate)".into()),
            ..Default::default()
        };
        let bindings = record.bindings();
        assert_eq!(bindings.len(), CertificateRecord::FIELDS.len());
        let description = bindings.iter().find(|(k, _)| *k == "description").unwrap();
        assert_eq!(description.1, "");
        assert_eq!(record.certificate_type(), "NOC (No Objection Certificate)");
        assert_eq!(record.content_hash(), None);
    }
}
