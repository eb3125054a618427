//! Settings UI collaborator.
//!
//! Features describe their settings panel through [`SettingsUi`]; the host
//! maps the calls onto its immediate-mode toolkit. [`RecordingUi`] is a
//! headless implementation that records the widgets drawn and applies
//! scripted edits.

use std::ops::RangeInclusive;

use rustc_hash::{FxHashMap, FxHashSet};

pub trait SettingsUi {
    /// Opens a collapsible section. Call [`tree_pop`](Self::tree_pop) only
    /// when this returns `true`.
    fn tree_node(&mut self, label: &str) -> bool;

    fn tree_pop(&mut self);

    fn checkbox(&mut self, label: &str, value: &mut bool) -> bool;

    fn slider_f32(&mut self, label: &str, value: &mut f32, range: RangeInclusive<f32>) -> bool;

    /// Slider with logarithmic response. Hosts without one fall back to linear.
    fn slider_f32_log(&mut self, label: &str, value: &mut f32, range: RangeInclusive<f32>) -> bool {
        self.slider_f32(label, value, range)
    }

    fn slider_u32(&mut self, label: &str, value: &mut u32, range: RangeInclusive<u32>) -> bool;

    fn color_edit(&mut self, label: &str, value: &mut [f32; 3]) -> bool;

    fn button(&mut self, label: &str) -> bool;

    fn text(&mut self, text: &str);

    /// Hover text for the previous widget.
    fn tooltip(&mut self, text: &str) {
        let _ = text;
    }
}

/// Checkbox over a GPU-side `uint` boolean.
pub fn checkbox_u32(ui: &mut dyn SettingsUi, label: &str, value: &mut u32) -> bool {
    let mut checked = *value != 0;
    let changed = ui.checkbox(label, &mut checked);
    if changed {
        *value = u32::from(checked);
    }
    changed
}

// ─── RecordingUi ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum UiWidget {
    TreeNode(String),
    TreePop,
    Checkbox(String, bool),
    Slider { label: String, value: f32, min: f32, max: f32 },
    Color(String, [f32; 3]),
    Button(String),
    Text(String),
}

/// Scripted user input for one widget label.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UiEdit {
    Bool(bool),
    Float(f32),
    Uint(u32),
    Color([f32; 3]),
    Click,
}

#[derive(Debug, Default)]
pub struct RecordingUi {
    pub widgets: Vec<UiWidget>,
    edits: FxHashMap<String, UiEdit>,
    collapsed: FxHashSet<String>,
    depth: usize,
}

impl RecordingUi {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `edit` the next time a widget labelled `label` is drawn.
    pub fn edit(&mut self, label: &str, edit: UiEdit) -> &mut Self {
        self.edits.insert(label.to_string(), edit);
        self
    }

    /// Keeps the tree node `label` closed.
    pub fn collapse(&mut self, label: &str) -> &mut Self {
        self.collapsed.insert(label.to_string());
        self
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.widgets.iter().filter_map(|widget| match widget {
            UiWidget::TreeNode(label)
            | UiWidget::Checkbox(label, _)
            | UiWidget::Slider { label, .. }
            | UiWidget::Color(label, _)
            | UiWidget::Button(label) => Some(label.as_str()),
            UiWidget::TreePop | UiWidget::Text(_) => None,
        })
    }

    /// Open tree nodes not yet popped.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    fn take(&mut self, label: &str) -> Option<UiEdit> {
        self.edits.remove(label)
    }
}

impl SettingsUi for RecordingUi {
    fn tree_node(&mut self, label: &str) -> bool {
        self.widgets.push(UiWidget::TreeNode(label.to_string()));
        let open = !self.collapsed.contains(label);
        if open {
            self.depth += 1;
        }
        open
    }

    fn tree_pop(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.widgets.push(UiWidget::TreePop);
    }

    fn checkbox(&mut self, label: &str, value: &mut bool) -> bool {
        let changed = match self.take(label) {
            Some(UiEdit::Bool(v)) => {
                *value = v;
                true
            }
            _ => false,
        };
        self.widgets.push(UiWidget::Checkbox(label.to_string(), *value));
        changed
    }

    fn slider_f32(&mut self, label: &str, value: &mut f32, range: RangeInclusive<f32>) -> bool {
        let changed = match self.take(label) {
            Some(UiEdit::Float(v)) => {
                *value = v.clamp(*range.start(), *range.end());
                true
            }
            _ => false,
        };
        self.widgets.push(UiWidget::Slider {
            label: label.to_string(),
            value: *value,
            min: *range.start(),
            max: *range.end(),
        });
        changed
    }

    #[allow(clippy::cast_precision_loss)]
    fn slider_u32(&mut self, label: &str, value: &mut u32, range: RangeInclusive<u32>) -> bool {
        let changed = match self.take(label) {
            Some(UiEdit::Uint(v)) => {
                *value = v.clamp(*range.start(), *range.end());
                true
            }
            _ => false,
        };
        self.widgets.push(UiWidget::Slider {
            label: label.to_string(),
            value: *value as f32,
            min: *range.start() as f32,
            max: *range.end() as f32,
        });
        changed
    }

    fn color_edit(&mut self, label: &str, value: &mut [f32; 3]) -> bool {
        let changed = match self.take(label) {
            Some(UiEdit::Color(v)) => {
                *value = v;
                true
            }
            _ => false,
        };
        self.widgets.push(UiWidget::Color(label.to_string(), *value));
        changed
    }

    fn button(&mut self, label: &str) -> bool {
        self.widgets.push(UiWidget::Button(label.to_string()));
        matches!(self.take(label), Some(UiEdit::Click))
    }

    fn text(&mut self, text: &str) {
        self.widgets.push(UiWidget::Text(text.to_string()));
    }
}
