use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Attendee {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub checked_in: bool,
}

impl Attendee {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// "Title, Company" with whichever parts are present.
    pub fn affiliation(&self) -> Option<String> {
        match (self.job_title.as_deref(), self.company.as_deref()) {
            (Some(t), Some(c)) if !t.is_empty() && !c.is_empty() => Some(format!("{}, {}", t, c)),
            (Some(t), _) if !t.is_empty() => Some(t.to_string()),
            (_, Some(c)) if !c.is_empty() => Some(c.to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attendee(title: Option<&str>, company: Option<&str>) -> Attendee {
        serde_json::from_value(json!({
            "id": "u1",
            "first_name": "Ada",
            "last_name": "Lovelace",
            "job_title": title,
            "company": company,
        }))
        .unwrap()
    }

    #[test]
    fn test_full_name() {
        assert_eq!(attendee(None, None).full_name(), "Ada Lovelace");
    }

    #[test]
    fn test_affiliation() {
        assert_eq!(
            attendee(Some("Engineer"), Some("Analytical")).affiliation().as_deref(),
            Some("Engineer, Analytical")
        );
        assert_eq!(attendee(None, Some("Analytical")).affiliation().as_deref(), Some("Analytical"));
        assert_eq!(attendee(Some(""), None).affiliation(), None);
    }
}
