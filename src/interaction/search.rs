//! State of the legend: search box, selection checkboxes and result labels.
//!
//! Nothing here talks to the backend directly: the handler asks for the
//! request to send and bumps the selection-map version.

use crate::net::message::{LabelsMsg, Request, SelectHow, SelectionUpdate};
use crate::types::ItemId;

const LABEL_MARKER_SIZE_MAX: f64 = 8.0;
const LABEL_LINE_WIDTH_MAX: f64 = 5.0;

#[derive(Clone, Debug, PartialEq)]
pub struct Label {
    pub item_id: ItemId,
    pub selected: bool,
    pub text: String,
    /// `color:marker_size:line_width`
    pub style: String,
    pub highlighted: bool,
}

impl Label {
    pub fn color(&self) -> &str {
        self.style.split(':').next().unwrap_or("")
    }

    fn style_field(&self, idx: usize, max: f64) -> f64 {
        self.style.split(':').nth(idx)
            .and_then(|v| v.parse::<f64>().ok())
            .map_or(0.0, |v| v.min(max))
    }

    /// Marker size for the legend swatch, capped.
    pub fn marker_size(&self) -> f64 {
        self.style_field(1, LABEL_MARKER_SIZE_MAX)
    }

    pub fn line_width(&self) -> f64 {
        self.style_field(2, LABEL_LINE_WIDTH_MAX)
    }
}

/// Buttons of the "More..." popup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectCommand {
    SelectAll,
    DeselectAll,
    SelectMatching,
    DeselectMatching,
}

pub struct SearchState {
    /// Sorted by item id.
    labels: Vec<Label>,
    /// Total number of matching items (may exceed `labels.len()`).
    count: usize,
    pattern: String,
    regex: bool,
    autoselect: bool,
    highlighted: Option<ItemId>,
}

impl Default for SearchState {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchState {
    pub fn new() -> Self {
        Self {
            labels: Vec::new(),
            count: 0,
            pattern: String::new(),
            regex: false,
            autoselect: true,
            highlighted: None,
        }
    }

    pub fn labels(&self) -> &[Label] { &self.labels }
    pub fn count(&self) -> usize { self.count }
    pub fn pattern(&self) -> &str { &self.pattern }
    pub fn regex(&self) -> bool { self.regex }
    pub fn autoselect(&self) -> bool { self.autoselect }
    pub fn highlighted(&self) -> Option<ItemId> { self.highlighted }

    pub fn label(&self, item_id: ItemId) -> Option<&Label> {
        self.labels.binary_search_by_key(&item_id, |l| l.item_id).ok().map(|i| &self.labels[i])
    }

    fn label_mut(&mut self, item_id: ItemId) -> Option<&mut Label> {
        let idx = self.labels.binary_search_by_key(&item_id, |l| l.item_id).ok()?;
        self.labels.get_mut(idx)
    }

    /// `search` request for a new pattern. `version` is set when autoselect
    /// turns the search into a selection change.
    pub fn search(&mut self, pattern: &str, regex: bool, version: Option<u32>) -> Request {
        self.pattern = pattern.to_string();
        self.regex = regex;
        Request::Search { version, pat: self.pattern.clone(), regex }
    }

    pub fn set_autoselect(&mut self, on: bool) {
        self.autoselect = on;
    }

    /// Select exactly what matches the current search (autoselect).
    pub fn select_exact(&mut self, version: u32) -> Request {
        for label in &mut self.labels {
            label.selected = true;
        }
        Request::UpdateSelection(SelectionUpdate {
            version,
            how: SelectHow::Exact,
            pat: Some(self.pattern.clone()),
            regex: Some(self.regex),
            ids: None,
        })
    }

    pub fn select(&mut self, cmd: SelectCommand, version: u32) -> Request {
        self.autoselect = false;
        let (pat, regex) = match cmd {
            SelectCommand::SelectAll | SelectCommand::DeselectAll => (String::new(), false),
            SelectCommand::SelectMatching | SelectCommand::DeselectMatching => (self.pattern.clone(), self.regex),
        };
        let select = matches!(cmd, SelectCommand::SelectAll | SelectCommand::SelectMatching);
        for label in &mut self.labels {
            label.selected = select;
            if !select { label.highlighted = false; }
        }
        if !select { self.highlighted = None; }
        Request::UpdateSelection(SelectionUpdate {
            version,
            how: if select { SelectHow::Select } else { SelectHow::Deselect },
            pat: Some(pat),
            regex: Some(regex),
            ids: None,
        })
    }

    /// A single checkbox was toggled.
    pub fn set_item_selected(&mut self, item_id: ItemId, selected: bool, version: u32) -> Request {
        self.autoselect = false;
        if let Some(label) = self.label_mut(item_id) {
            label.selected = selected;
            if !selected { label.highlighted = false; }
        }
        if !selected && self.highlighted == Some(item_id) {
            self.highlighted = None;
        }
        Request::UpdateSelection(SelectionUpdate {
            version,
            how: if selected { SelectHow::Select } else { SelectHow::Deselect },
            pat: None,
            regex: None,
            ids: Some(vec![item_id]),
        })
    }

    /// Mark which label is highlighted (mirrors the canvas highlight).
    pub fn set_highlighted(&mut self, item_id: Option<ItemId>) {
        if let Some(old) = self.highlighted.filter(|old| Some(*old) != item_id) {
            if let Some(label) = self.label_mut(old) {
                label.highlighted = false;
            }
        }
        self.highlighted = None;
        if let Some(id) = item_id {
            if let Some(label) = self.label_mut(id) {
                label.highlighted = true;
                self.highlighted = Some(id);
            }
        }
    }

    pub fn is_label_highlighted(&self, item_id: ItemId) -> bool {
        self.label(item_id).is_some_and(|l| l.highlighted)
    }

    /// Replace the result list. Retained labels keep their highlight.
    pub fn apply_labels(&mut self, msg: LabelsMsg) {
        let mut labels: Vec<Label> = msg.labels.into_iter()
            .map(|(item_id, selected, text, style)| Label {
                highlighted: self.highlighted == Some(item_id),
                item_id,
                selected,
                text,
                style,
            })
            .collect();
        labels.sort_by_key(|l| l.item_id);
        labels.dedup_by_key(|l| l.item_id);

        if let Some(id) = self.highlighted {
            if labels.binary_search_by_key(&id, |l| l.item_id).is_err() {
                self.highlighted = None;
            }
        }
        self.labels = labels;
        self.count = msg.count;
    }

    /// One-line summary of the search result.
    pub fn summary(&self) -> String {
        let len = self.labels.len();
        match len {
            0 => "No matching items.".to_string(),
            1 => "1 Matching item.".to_string(),
            _ if len == self.count => format!("{len} matching items."),
            _ => format!("Showing {len} of {} matching items.", self.count),
        }
    }
}
