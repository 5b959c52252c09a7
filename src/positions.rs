//! Persisted relative positions for the draggable face elements.

use crate::error::KioskResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaceElement {
    Eyes,
    Mouth,
}

impl FaceElement {
    pub fn key(self) -> &'static str {
        match self {
            FaceElement::Eyes => "eye_position",
            FaceElement::Mouth => "mouth_position",
        }
    }

    pub fn default_position(self) -> ElementPosition {
        match self {
            FaceElement::Eyes => ElementPosition::new(0.5, 0.3),
            FaceElement::Mouth => ElementPosition::new(0.5, 0.5),
        }
    }
}

impl std::str::FromStr for FaceElement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "eyes" | "eye" => Ok(FaceElement::Eyes),
            "mouth" => Ok(FaceElement::Mouth),
            other => Err(format!("unknown face element '{}'", other)),
        }
    }
}

/// Position relative to the free space of the container, each axis in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElementPosition {
    pub x: f32,
    pub y: f32,
}

fn clamp_unit(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

impl ElementPosition {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x: clamp_unit(x),
            y: clamp_unit(y),
        }
    }

    /// Top-left pixel offset of an element of `element_size` inside `container`.
    pub fn to_pixels(&self, container: (f32, f32), element_size: (f32, f32)) -> (f32, f32) {
        let free_x = (container.0 - element_size.0).max(0.0);
        let free_y = (container.1 - element_size.1).max(0.0);
        (self.x * free_x, self.y * free_y)
    }

    /// New position after a drag of `(dx, dy)` pixels.
    pub fn dragged_by(
        &self,
        dx: f32,
        dy: f32,
        container: (f32, f32),
        element_size: (f32, f32),
    ) -> Self {
        let free_x = container.0 - element_size.0;
        let free_y = container.1 - element_size.1;
        let x = if free_x > 0.0 { self.x + dx / free_x } else { self.x };
        let y = if free_y > 0.0 { self.y + dy / free_y } else { self.y };
        Self::new(x, y)
    }
}

pub trait PositionStore: Send + Sync {
    fn load(&self, key: &str) -> KioskResult<Option<ElementPosition>>;
    fn save(&self, key: &str, position: ElementPosition) -> KioskResult<()>;
}

pub struct SledPositionStore {
    db: sled::Db,
}

impl SledPositionStore {
    pub fn open(path: &Path) -> KioskResult<Self> {
        let db = sled::open(path)?;
        info!("Positions: store opened at {}", path.display());
        Ok(Self { db })
    }

    /// In-memory sled instance removed on drop.
    pub fn temporary() -> KioskResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }
}

impl PositionStore for SledPositionStore {
    fn load(&self, key: &str) -> KioskResult<Option<ElementPosition>> {
        match self.db.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn save(&self, key: &str, position: ElementPosition) -> KioskResult<()> {
        let bytes = serde_json::to_vec(&position)?;
        self.db.insert(key, bytes)?;
        self.db.flush()?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryPositionStore {
    entries: Mutex<HashMap<String, ElementPosition>>,
}

impl PositionStore for MemoryPositionStore {
    fn load(&self, key: &str) -> KioskResult<Option<ElementPosition>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).copied())
    }

    fn save(&self, key: &str, position: ElementPosition) -> KioskResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), position);
        Ok(())
    }
}

/// One face element bound to its persisted record.
pub struct DraggablePosition {
    store: Arc<dyn PositionStore>,
    element: FaceElement,
    current: ElementPosition,
}

impl DraggablePosition {
    pub fn new(store: Arc<dyn PositionStore>, element: FaceElement) -> Self {
        let current = match store.load(element.key()) {
            Ok(Some(saved)) => {
                debug!("Positions: restored {:?} at {:?}", element, saved);
                // Stored values from older builds may be out of range
                ElementPosition::new(saved.x, saved.y)
            }
            Ok(None) => element.default_position(),
            Err(e) => {
                warn!("Positions: could not load {}: {}", element.key(), e);
                element.default_position()
            }
        };
        Self {
            store,
            element,
            current,
        }
    }

    pub fn element(&self) -> FaceElement {
        self.element
    }

    pub fn position(&self) -> ElementPosition {
        self.current
    }

    /// Clamps, keeps, and persists `position`. The in-memory value is
    /// updated even if saving fails.
    pub fn update(&mut self, position: ElementPosition) -> ElementPosition {
        self.current = ElementPosition::new(position.x, position.y);
        if let Err(e) = self.store.save(self.element.key(), self.current) {
            warn!("Positions: could not save {}: {}", self.element.key(), e);
        }
        self.current
    }

    pub fn drag(
        &mut self,
        dx: f32,
        dy: f32,
        container: (f32, f32),
        element_size: (f32, f32),
    ) -> ElementPosition {
        let next = self.current.dragged_by(dx, dy, container, element_size);
        self.update(next)
    }
}

/// Both face elements, for callers that address them by name.
pub struct FaceLayout {
    pub eyes: DraggablePosition,
    pub mouth: DraggablePosition,
}

impl FaceLayout {
    pub fn load(store: Arc<dyn PositionStore>) -> Self {
        Self {
            eyes: DraggablePosition::new(store.clone(), FaceElement::Eyes),
            mouth: DraggablePosition::new(store, FaceElement::Mouth),
        }
    }

    pub fn get_mut(&mut self, element: FaceElement) -> &mut DraggablePosition {
        match element {
            FaceElement::Eyes => &mut self.eyes,
            FaceElement::Mouth => &mut self.mouth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KioskError;
    use proptest::prelude::*;

    struct UnavailableStore;

    impl PositionStore for UnavailableStore {
        fn load(&self, _key: &str) -> KioskResult<Option<ElementPosition>> {
            Err(KioskError::Store("store unavailable".to_string()))
        }

        fn save(&self, _key: &str, _position: ElementPosition) -> KioskResult<()> {
            Err(KioskError::Store("store unavailable".to_string()))
        }
    }

    #[test]
    fn test_defaults_when_store_is_empty() {
        let store: Arc<dyn PositionStore> = Arc::new(MemoryPositionStore::default());
        let layout = FaceLayout::load(store);
        assert_eq!(layout.eyes.position(), ElementPosition::new(0.5, 0.3));
        assert_eq!(layout.mouth.position(), ElementPosition::new(0.5, 0.5));
    }

    #[test]
    fn test_elements_are_stored_independently() {
        let store: Arc<dyn PositionStore> = Arc::new(MemoryPositionStore::default());
        let mut layout = FaceLayout::load(store.clone());
        layout.eyes.update(ElementPosition::new(0.1, 0.2));

        assert_eq!(
            store.load("eye_position").unwrap(),
            Some(ElementPosition::new(0.1, 0.2))
        );
        assert_eq!(store.load("mouth_position").unwrap(), None);

        layout
            .get_mut(FaceElement::Mouth)
            .drag(1000.0, 0.0, (300.0, 200.0), (100.0, 100.0));
        assert_eq!(
            store.load("mouth_position").unwrap(),
            Some(ElementPosition::new(1.0, 0.5))
        );
    }

    #[test]
    fn test_sled_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("positions");
        {
            let store: Arc<dyn PositionStore> = Arc::new(SledPositionStore::open(&path).unwrap());
            let mut mouth = DraggablePosition::new(store, FaceElement::Mouth);
            mouth.update(ElementPosition::new(0.25, 0.75));
        }
        let store: Arc<dyn PositionStore> = Arc::new(SledPositionStore::open(&path).unwrap());
        let mouth = DraggablePosition::new(store, FaceElement::Mouth);
        assert_eq!(mouth.position(), ElementPosition::new(0.25, 0.75));
    }

    #[test]
    fn test_corrupt_record_falls_back_to_default() {
        let store = SledPositionStore::temporary().unwrap();
        store.db.insert("eye_position", &b"not json"[..]).unwrap();

        let eyes = DraggablePosition::new(Arc::new(store), FaceElement::Eyes);
        assert_eq!(eyes.position(), FaceElement::Eyes.default_position());
    }

    #[test]
    fn test_failing_store_degrades() {
        let mut eyes = DraggablePosition::new(Arc::new(UnavailableStore), FaceElement::Eyes);
        assert_eq!(eyes.position(), FaceElement::Eyes.default_position());

        // Save fails but the element still moves
        let moved = eyes.update(ElementPosition::new(0.9, 0.9));
        assert_eq!(moved, ElementPosition::new(0.9, 0.9));
        assert_eq!(eyes.position(), moved);
    }

    #[test]
    fn test_drag_math() {
        let start = ElementPosition::new(0.5, 0.5);
        // 200x100 free space
        let moved = start.dragged_by(50.0, -25.0, (300.0, 200.0), (100.0, 100.0));
        assert_eq!(moved, ElementPosition::new(0.75, 0.25));
        assert_eq!(moved.to_pixels((300.0, 200.0), (100.0, 100.0)), (150.0, 25.0));

        // Element fills the container: no movement possible
        let stuck = start.dragged_by(50.0, 50.0, (100.0, 100.0), (100.0, 100.0));
        assert_eq!(stuck, start);
    }

    #[test]
    fn test_face_element_parse() {
        assert_eq!("eyes".parse::<FaceElement>(), Ok(FaceElement::Eyes));
        assert_eq!("Mouth".parse::<FaceElement>(), Ok(FaceElement::Mouth));
        assert!("nose".parse::<FaceElement>().is_err());
    }

    proptest! {
        #[test]
        fn prop_positions_stay_in_unit_square(
            x in -10.0f32..10.0,
            y in -10.0f32..10.0,
            dx in -5000.0f32..5000.0,
            dy in -5000.0f32..5000.0,
        ) {
            let pos = ElementPosition::new(x, y).dragged_by(dx, dy, (800.0, 600.0), (120.0, 80.0));
            prop_assert!((0.0..=1.0).contains(&pos.x));
            prop_assert!((0.0..=1.0).contains(&pos.y));
        }
    }
}
