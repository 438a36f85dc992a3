//! Concrete record types for the capture tool.
//!
//! These are the facts the host publishes about the desktop (displays,
//! windows) and the facts either side publishes about what the user is doing
//! (capture activity, open editors, preferences). All fields are plain data
//! and cross the process boundary as camelCase JSON.

use serde::{Deserialize, Serialize};

use crate::id::{BrowserWindowId, ChildWindowId, DisplayId, RecordId};

/// The closed set of record type tags.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    Display,
    Window,
    Capture,
    Editor,
    Preferences,
}

impl RecordType {
    /// All registered type tags, in stable order.
    pub const ALL: [RecordType; 5] = [
        RecordType::Display,
        RecordType::Window,
        RecordType::Capture,
        RecordType::Editor,
        RecordType::Preferences,
    ];

    /// The ID prefix for this type.
    pub fn prefix(&self) -> &'static str {
        match self {
            RecordType::Display => "display",
            RecordType::Window => "window",
            RecordType::Capture => "capture",
            RecordType::Editor => "editor",
            RecordType::Preferences => "preferences",
        }
    }
}

impl std::str::FromStr for RecordType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "display" => Ok(RecordType::Display),
            "window" => Ok(RecordType::Window),
            "capture" => Ok(RecordType::Capture),
            "editor" => Ok(RecordType::Editor),
            "preferences" => Ok(RecordType::Preferences),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.prefix())
    }
}

/// A screen-space rectangle.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Bounds {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// A physical display attached to the machine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayRecord {
    pub id: RecordId,
    pub display_id: DisplayId,
    pub bounds: Bounds,
    pub work_area: Bounds,
    pub scale_factor: f64,
}

impl DisplayRecord {
    /// Creates a display record pinned to its platform display ID.
    ///
    /// Each platform display maps to exactly one record, so the record ID is
    /// derived from the display ID rather than minted.
    pub fn new(display_id: DisplayId, bounds: Bounds, work_area: Bounds, scale_factor: f64) -> Self {
        Self {
            id: Self::id_for(display_id),
            display_id,
            bounds,
            work_area,
            scale_factor,
        }
    }

    /// The deterministic record ID for a platform display.
    pub fn id_for(display_id: DisplayId) -> RecordId {
        RecordId::custom(RecordType::Display, &display_id.to_string())
    }
}

/// A native window owned by a display process.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowRecord {
    pub id: RecordId,
    pub browser_window_id: BrowserWindowId,
    pub child_window_id: Option<ChildWindowId>,
    pub display_id: DisplayId,
    pub bounds: Bounds,
    pub is_visible: bool,
    pub is_always_on_top: bool,
}

impl WindowRecord {
    pub fn new(
        browser_window_id: BrowserWindowId,
        display_id: DisplayId,
        bounds: Bounds,
    ) -> Self {
        Self {
            id: RecordId::new(RecordType::Window),
            browser_window_id,
            child_window_id: None,
            display_id,
            bounds,
            is_visible: false,
            is_always_on_top: false,
        }
    }
}

/// What kind of capture the user is performing.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CaptureMode {
    Window,
    Area,
    FullScreen,
}

/// The in-flight capture activity. At most one exists at a time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureActivityRecord {
    pub id: RecordId,
    #[serde(rename = "type")]
    pub mode: CaptureMode,
}

impl CaptureActivityRecord {
    /// Creates the capture singleton in the given mode.
    pub fn singleton(mode: CaptureMode) -> Self {
        Self {
            id: Self::singleton_id(),
            mode,
        }
    }

    /// The fixed ID of the capture singleton.
    pub fn singleton_id() -> RecordId {
        RecordId::custom(RecordType::Capture, "activity")
    }
}

/// An open annotation editor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorRecord {
    pub id: RecordId,
    pub hidden: bool,
    pub file_path: Option<String>,
}

impl EditorRecord {
    pub fn new() -> Self {
        Self {
            id: RecordId::new(RecordType::Editor),
            hidden: false,
            file_path: None,
        }
    }
}

impl Default for EditorRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// User preferences. Durability is handled outside the store by a collaborator
/// that mirrors this record's fields to disk.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesRecord {
    pub id: RecordId,
    pub editor_window_bounds: Option<Bounds>,
    pub editor_window_devtools: bool,
}

impl PreferencesRecord {
    /// Creates the preferences singleton with defaults.
    pub fn singleton() -> Self {
        Self {
            id: Self::singleton_id(),
            editor_window_bounds: None,
            editor_window_devtools: false,
        }
    }

    /// The fixed ID of the preferences singleton.
    pub fn singleton_id() -> RecordId {
        RecordId::custom(RecordType::Preferences, "preferences")
    }
}

/// Any record the store can hold.
///
/// The `typeName` tag on the wire matches the ID prefix; the schema rejects
/// records where the two disagree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "typeName", rename_all = "lowercase")]
pub enum Record {
    Display(DisplayRecord),
    Window(WindowRecord),
    Capture(CaptureActivityRecord),
    Editor(EditorRecord),
    Preferences(PreferencesRecord),
}

impl Record {
    /// The record's ID.
    pub fn id(&self) -> &RecordId {
        match self {
            Record::Display(r) => &r.id,
            Record::Window(r) => &r.id,
            Record::Capture(r) => &r.id,
            Record::Editor(r) => &r.id,
            Record::Preferences(r) => &r.id,
        }
    }

    /// The record's type tag.
    pub fn record_type(&self) -> RecordType {
        match self {
            Record::Display(_) => RecordType::Display,
            Record::Window(_) => RecordType::Window,
            Record::Capture(_) => RecordType::Capture,
            Record::Editor(_) => RecordType::Editor,
            Record::Preferences(_) => RecordType::Preferences,
        }
    }

    pub fn as_display(&self) -> Option<&DisplayRecord> {
        match self {
            Record::Display(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_window(&self) -> Option<&WindowRecord> {
        match self {
            Record::Window(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_capture(&self) -> Option<&CaptureActivityRecord> {
        match self {
            Record::Capture(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_editor(&self) -> Option<&EditorRecord> {
        match self {
            Record::Editor(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_preferences(&self) -> Option<&PreferencesRecord> {
        match self {
            Record::Preferences(r) => Some(r),
            _ => None,
        }
    }
}

impl From<DisplayRecord> for Record {
    fn from(r: DisplayRecord) -> Self {
        Record::Display(r)
    }
}

impl From<WindowRecord> for Record {
    fn from(r: WindowRecord) -> Self {
        Record::Window(r)
    }
}

impl From<CaptureActivityRecord> for Record {
    fn from(r: CaptureActivityRecord) -> Self {
        Record::Capture(r)
    }
}

impl From<EditorRecord> for Record {
    fn from(r: EditorRecord) -> Self {
        Record::Editor(r)
    }
}

impl From<PreferencesRecord> for Record {
    fn from(r: PreferencesRecord) -> Self {
        Record::Preferences(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_record_id_tracks_display_id() {
        let bounds = Bounds::new(0, 0, 1920, 1080);
        let record = DisplayRecord::new(DisplayId(2), bounds, bounds, 2.0);

        assert_eq!(record.id.as_str(), "display:2");
        assert_eq!(record.id, DisplayRecord::id_for(DisplayId(2)));
    }

    #[test]
    fn capture_singleton_always_collides() {
        let a = CaptureActivityRecord::singleton(CaptureMode::Area);
        let b = CaptureActivityRecord::singleton(CaptureMode::FullScreen);
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn record_type_matches_id_prefix() {
        let record: Record = EditorRecord::new().into();
        assert_eq!(record.record_type(), RecordType::Editor);
        assert_eq!(record.id().record_type(), Ok(RecordType::Editor));
    }

    #[test]
    fn record_wire_shape_is_tagged_camel_case() {
        let bounds = Bounds::new(0, 0, 1920, 1080);
        let record: Record = DisplayRecord::new(DisplayId(1), bounds, bounds, 1.0).into();
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["typeName"], "display");
        assert_eq!(json["displayId"], 1);
        assert_eq!(json["bounds"]["width"], 1920);

        let back: Record = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn capture_mode_serializes_under_type_key() {
        let record: Record = CaptureActivityRecord::singleton(CaptureMode::FullScreen).into();
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["typeName"], "capture");
        assert_eq!(json["type"], "fullScreen");
    }

    #[test]
    fn unknown_type_name_fails_to_decode() {
        let json = serde_json::json!({ "typeName": "gadget", "id": "gadget:1" });
        assert!(serde_json::from_value::<Record>(json).is_err());
    }
}
