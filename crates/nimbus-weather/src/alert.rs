//! Alert records built from active-alert features.

use crate::api::AlertProperties;
use crate::format::display_timestamp;
use crate::types::{AlertArea, AlertRecord, Severity};

const HAZARD_MARKERS: [&str; 2] = ["HAZARD...", "* WHAT..."];
const IMPACT_MARKERS: [&str; 2] = ["IMPACTS...", "* IMPACTS..."];

/// Text following the first matching section marker, up to the next blank line or
/// bulleted section. Whitespace is collapsed.
pub fn description_excerpt(description: &str, markers: &[&str]) -> Option<String> {
    let (start, marker) = markers
        .iter()
        .filter_map(|m| description.find(m).map(|pos| (pos, *m)))
        .min_by_key(|(pos, _)| *pos)?;
    let rest = &description[start + marker.len()..];
    let end = ["\n\n", "\n*", "\n\r\n"]
        .iter()
        .filter_map(|sep| rest.find(sep))
        .min()
        .unwrap_or(rest.len());

    let text = rest[..end].split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}

/// `"<Event> in effect for <areas> from <start> until <end>."`, skipping absent parts.
pub fn alert_sentence(
    event: Option<&str>,
    areas: Option<&str>,
    start: Option<&str>,
    end: Option<&str>,
) -> String {
    let mut sentence = event
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .unwrap_or("Weather alert")
        .to_string();
    sentence.push_str(" in effect");
    if let Some(areas) = areas.filter(|a| !a.trim().is_empty()) {
        sentence.push_str(&format!(" for {}", areas.trim()));
    }
    if let Some(start) = start {
        sentence.push_str(&format!(" from {}", start));
    }
    if let Some(end) = end {
        sentence.push_str(&format!(" until {}", end));
    }
    sentence.push('.');
    sentence
}

pub fn build_record(props: AlertProperties, areas: Vec<AlertArea>) -> AlertRecord {
    let start_iso = props.effective.clone().or_else(|| props.onset.clone());
    let end_iso = props.ends.clone().or_else(|| props.expires.clone());
    let start = display_timestamp(start_iso.as_deref());
    let end = display_timestamp(end_iso.as_deref());

    let area_names = if areas.is_empty() {
        props.area_desc.clone()
    } else {
        Some(areas.iter().map(|a| a.name.as_str()).collect::<Vec<_>>().join(", "))
    };
    let sentence = alert_sentence(
        props.event.as_deref(),
        area_names.as_deref(),
        start.as_deref(),
        end.as_deref(),
    );

    let description = props.description.as_deref().unwrap_or_default();
    AlertRecord {
        id: props.id,
        title: props.headline.or_else(|| props.event.clone()),
        event: props.event,
        sentence,
        severity_slug: Severity::from_raw(props.severity.as_deref()),
        severity: props.severity,
        area_description: props.area_desc,
        areas,
        issuer: props.sender_name,
        sent: display_timestamp(props.sent.as_deref()),
        start_iso,
        end_iso,
        start,
        end,
        hazard: description_excerpt(description, &HAZARD_MARKERS),
        impacts: description_excerpt(description, &IMPACT_MARKERS),
        instruction: props
            .instruction
            .map(|i| i.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|i| !i.is_empty()),
    }
}
