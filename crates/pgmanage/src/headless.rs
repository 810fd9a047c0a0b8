//! Widgets for runs without a UI.

use pgmanage_core::factories::{EditorOptions, Widget, WidgetFactory, WidgetKind};
use pgmanage_core::models::TabId;

struct LoggedWidget {
    kind: WidgetKind,
    tab_id: TabId,
}

impl Widget for LoggedWidget {
    fn kind(&self) -> WidgetKind {
        self.kind
    }

    fn destroy(&self) {
        tracing::trace!(kind = ?self.kind, tab_id = %self.tab_id, "Widget destroyed");
    }
}

/// Factory producing widgets that only log their lifecycle.
#[derive(Debug, Default)]
pub struct HeadlessWidgets;

impl HeadlessWidgets {
    fn widget(kind: WidgetKind, tab_id: TabId) -> Box<dyn Widget> {
        tracing::trace!(kind = ?kind, tab_id = %tab_id, "Widget created");
        Box::new(LoggedWidget { kind, tab_id })
    }
}

impl WidgetFactory for HeadlessWidgets {
    fn editor(&self, tab_id: TabId, _options: EditorOptions) -> Box<dyn Widget> {
        Self::widget(WidgetKind::Editor, tab_id)
    }

    fn terminal(&self, tab_id: TabId) -> Box<dyn Widget> {
        Self::widget(WidgetKind::Terminal, tab_id)
    }

    fn grid(&self, tab_id: TabId) -> Box<dyn Widget> {
        Self::widget(WidgetKind::Grid, tab_id)
    }
}
