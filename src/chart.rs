//! Chart readout: recovers labeled values from the rendered SVG bar chart.

use scraper::{ElementRef, Html, Selector};
use serde::Serialize;

/// Default `aria-label` of the button wrapping the chart SVG.
pub const DEFAULT_CHART_LABEL: &str = "Byt sortering";

/// Ordered set of entity/value pairs read from the chart for one selection.
///
/// Values keep their exact source formatting (`"10%"`, `"1,5"`); they are
/// never parsed into numbers. An empty observation is the normal outcome of
/// a failed readout, not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Observation {
    entries: Vec<(String, String)>,
}

impl Observation {
    /// Creates an empty observation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one entity/value pair.
    pub fn push(&mut self, entity: impl Into<String>, value: impl Into<String>) {
        self.entries.push((entity.into(), value.into()));
    }

    /// The `(entity, value)` pairs in the order they appear in the chart.
    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    /// Number of observed entities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the readout found nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Attribute predicate identifying a text node's role inside the chart.
///
/// Matched independently per pair, so one corrupt pair never poisons its
/// neighbors.
#[derive(Debug, Clone)]
struct TextMarker {
    font_weight: &'static str,
    dy: Option<&'static str>,
}

impl TextMarker {
    fn matches(&self, element: ElementRef<'_>) -> bool {
        let value = element.value();
        if value.attr("font-weight") != Some(self.font_weight) {
            return false;
        }
        match self.dy {
            Some(dy) => value.attr("dy") == Some(dy),
            None => true,
        }
    }
}

/// Declarative description of the chart structure the extractor scans.
///
/// The chart is an SVG nested under a uniquely `aria-label`ed button. Its
/// second top-level group holds the series: direct child groups alternate in
/// (value, label) pairs, the value text carrying a bold marker at a fixed
/// vertical offset and the label text a heavier weight.
#[derive(Debug, Clone)]
pub struct ChartPattern {
    container: Selector,
    text: Selector,
    value_marker: TextMarker,
    label_marker: TextMarker,
}

impl ChartPattern {
    /// Builds the pattern for a chart wrapped by a button with the given
    /// `aria-label`.
    pub fn for_chart_label(chart_label: &str) -> Self {
        let container = format!("button[aria-label='{}'] svg", escape_css_string(chart_label));
        Self {
            container: Selector::parse(&container).expect("chart container selector"),
            text: Selector::parse("text").expect("text selector"),
            value_marker: TextMarker {
                font_weight: "bold",
                dy: Some("-0.33em"),
            },
            label_marker: TextMarker {
                font_weight: "900",
                dy: None,
            },
        }
    }

    /// True when the chart container exists in the page snapshot.
    pub fn container_present(&self, html: &str) -> bool {
        let document = Html::parse_document(html);
        document.select(&self.container).next().is_some()
    }

    /// Reads one observation out of a page snapshot.
    ///
    /// Absent containers, truncated group lists, and corrupt pairs all
    /// degrade to fewer (or zero) entries, never an error.
    pub fn extract(&self, html: &str) -> Observation {
        let document = Html::parse_document(html);
        self.extract_from(&document)
    }

    /// Reads one observation out of an already parsed document.
    pub fn extract_from(&self, document: &Html) -> Observation {
        let mut observation = Observation::new();
        let Some(svg) = document.select(&self.container).next() else {
            return observation;
        };

        let top_groups: Vec<ElementRef<'_>> =
            svg.child_elements().filter(|el| is_group(*el)).collect();
        let Some(series) = top_groups.get(1) else {
            return observation;
        };

        let groups: Vec<ElementRef<'_>> = series
            .child_elements()
            .filter(|el| is_group(*el))
            .collect();
        for pair in groups.chunks(2) {
            let [value_group, label_group] = pair else {
                continue;
            };
            let value = self.marked_text(*value_group, &self.value_marker);
            let label = self.marked_text(*label_group, &self.label_marker);
            if let (Some(label), Some(value)) = (label, value) {
                observation.push(label, value);
            }
        }

        observation
    }

    fn marked_text(&self, group: ElementRef<'_>, marker: &TextMarker) -> Option<String> {
        group
            .select(&self.text)
            .filter(|el| marker.matches(*el))
            .find_map(|el| {
                let text = collapse_whitespace(&el.text().collect::<String>());
                (!text.is_empty()).then_some(text)
            })
    }
}

impl Default for ChartPattern {
    fn default() -> Self {
        Self::for_chart_label(DEFAULT_CHART_LABEL)
    }
}

fn is_group(element: ElementRef<'_>) -> bool {
    element.value().name() == "g"
}

fn escape_css_string(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        if ch == '\\' || ch == '\'' {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Collapses runs of whitespace to single spaces and trims the ends.
pub(crate) fn collapse_whitespace(input: &str) -> String {
    let mut buf = String::with_capacity(input.len());
    let mut last_space = false;
    for ch in input.chars() {
        if ch.is_whitespace() {
            if !last_space && !buf.is_empty() {
                buf.push(' ');
            }
            last_space = true;
        } else {
            buf.push(ch);
            last_space = false;
        }
    }
    buf.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pairs(observation: &Observation) -> Vec<(&str, &str)> {
        observation
            .entries()
            .iter()
            .map(|(entity, value)| (entity.as_str(), value.as_str()))
            .collect()
    }

    fn chart_page(series: &str) -> String {
        format!(
            r#"
            <html><body>
              <header><svg><g><text font-weight="bold">decoy</text></g></svg></header>
              <button aria-label="Byt sortering">
                <svg>
                  <g><text>axis ticks</text></g>
                  <g>{series}</g>
                  <g><text font-weight="bold" dy="-0.33em">legend decoy</text></g>
                </svg>
              </button>
            </body></html>
            "#
        )
    }

    fn series_pair(value: &str, label: &str) -> String {
        format!(
            r#"<g><rect/><text dy="-0.33em" font-weight="bold" paint-order="stroke">{value}</text></g>
               <g><text font-weight="900">{label}</text></g>"#
        )
    }

    #[test]
    fn extracts_all_well_formed_pairs() {
        let series = [
            series_pair("10%", "Party1"),
            series_pair("5%", "Party2"),
            series_pair("2,5", "Party3"),
        ]
        .join("\n");
        let observation = ChartPattern::default().extract(&chart_page(&series));
        assert_eq!(
            pairs(&observation),
            vec![("Party1", "10%"), ("Party2", "5%"), ("Party3", "2,5")]
        );
    }

    #[test]
    fn skips_pairs_missing_either_marker() {
        let series = format!(
            r#"{}
               <g><text font-weight="bold">no offset marker</text></g>
               <g><text font-weight="900">Orphan</text></g>
               {}"#,
            series_pair("10%", "Party1"),
            series_pair("5%", "Party2"),
        );
        let observation = ChartPattern::default().extract(&chart_page(&series));
        assert_eq!(pairs(&observation), vec![("Party1", "10%"), ("Party2", "5%")]);
    }

    #[test]
    fn ignores_trailing_unpaired_group() {
        let series = format!(
            r#"{}
               <g><text dy="-0.33em" font-weight="bold">7%</text></g>"#,
            series_pair("10%", "Party1"),
        );
        let observation = ChartPattern::default().extract(&chart_page(&series));
        assert_eq!(pairs(&observation), vec![("Party1", "10%")]);
    }

    #[test]
    fn first_matching_text_wins_within_a_group() {
        let series = r#"
            <g>
              <text font-weight="bold">not the value</text>
              <text dy="-0.33em" font-weight="bold">42%</text>
              <text dy="-0.33em" font-weight="bold">later twin</text>
            </g>
            <g><text font-weight="400">plain</text><text font-weight="900">Party1</text></g>
        "#;
        let observation = ChartPattern::default().extract(&chart_page(series));
        assert_eq!(pairs(&observation), vec![("Party1", "42%")]);
    }

    #[test]
    fn missing_container_yields_empty_observation() {
        let html = "<html><body><svg><g/><g/></svg></body></html>";
        let observation = ChartPattern::default().extract(html);
        assert!(observation.is_empty());
    }

    #[test]
    fn single_top_level_group_yields_empty_observation() {
        let html = r#"
            <button aria-label="Byt sortering">
              <svg><g><text font-weight="900">lonely</text></g></svg>
            </button>
        "#;
        let observation = ChartPattern::default().extract(html);
        assert!(observation.is_empty());
    }

    #[test]
    fn container_presence_probe() {
        let pattern = ChartPattern::default();
        assert!(pattern.container_present(&chart_page("")));
        assert!(!pattern.container_present("<html><body>loading...</body></html>"));
    }

    #[test]
    fn custom_chart_label_is_escaped() {
        let pattern = ChartPattern::for_chart_label("It's a 'chart'");
        let html = r#"
            <button aria-label="It's a 'chart'">
              <svg>
                <g/>
                <g>
                  <g><text dy="-0.33em" font-weight="bold">1%</text></g>
                  <g><text font-weight="900">Only</text></g>
                </g>
              </svg>
            </button>
        "#;
        assert_eq!(pairs(&pattern.extract(html)), vec![("Only", "1%")]);
    }
}
