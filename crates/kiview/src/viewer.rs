//! Per-document viewer state machine.
//!
//! The viewer owns the viewport, the selection and the stack of hierarchy
//! levels. It never mutates a document; reloading replaces the whole stack.

use std::convert::Infallible;
use std::sync::Arc;

use kicad_doc::error::{NotFoundError, UnresolvedSheetError};
use kicad_doc::geometry::{BBox, Point};
use kicad_doc::hierarchy::{HierarchyResolver, InstancePath, SheetSource};
use kicad_doc::types::{properties_by_id, Document, DocumentKind, Entity, EntityId, Positioned};
use kicad_doc::Loaded;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hittest::HitTester;
use crate::transform::ViewportTransform;

// ─── Options ─────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerOptions {
    /// Hit-test padding for schematic entities, in document units.
    pub schematic_tolerance: f64,
    /// Hit-test padding for board entities, in document units.
    pub board_tolerance: f64,
    /// Margin added around the document extent when fitting.
    pub fit_padding: f64,
    /// Selecting the same entity twice shows its details.
    pub details_on_reselect: bool,
    /// Selecting the same sheet instance twice descends into it.
    pub descend_on_reselect: bool,
    pub min_zoom: f64,
    pub max_zoom: f64,
}

impl Default for ViewerOptions {
    fn default() -> Self {
        Self {
            schematic_tolerance: 0.25,
            board_tolerance: 0.1,
            fit_padding: 2.0,
            details_on_reselect: true,
            descend_on_reselect: true,
            min_zoom: 0.05,
            max_zoom: 500.0,
        }
    }
}

impl ViewerOptions {
    /// Zoom limits, ordered. Bounds that are not positive finite numbers
    /// fall back to the defaults.
    pub fn zoom_range(&self) -> (f64, f64) {
        let defaults = Self::default();
        let valid = |v: f64| v.is_finite() && v > 0.0;
        let min = if valid(self.min_zoom) { self.min_zoom } else { defaults.min_zoom };
        let max = if valid(self.max_zoom) { self.max_zoom } else { defaults.max_zoom };
        if min <= max {
            (min, max)
        } else {
            (max, min)
        }
    }

    pub fn tolerance(&self, kind: DocumentKind) -> f64 {
        match kind {
            DocumentKind::Schematic => self.schematic_tolerance,
            DocumentKind::Board => self.board_tolerance,
        }
    }
}

// ─── Events ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum ViewerState {
    Empty,
    Loading,
    Ready,
    Error(String),
}

/// Generation number of one load request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Applied,
    Failed,
    /// A newer load was started; the result was discarded.
    Superseded,
}

/// Properties of an entity, for a details panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Details {
    pub entity: EntityId,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Name and value, in display order.
    pub properties: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "error", rename_all = "snake_case")]
pub enum DescendOutcome {
    Descended,
    /// No sheet source attached; the host decides what to do.
    Deferred,
    Failed(UnresolvedSheetError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum Effect {
    ShowDetails(Details),
    DescendSheet {
        file: String,
        sheet_path: InstancePath,
        outcome: DescendOutcome,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionChanged {
    pub selected: Option<EntityId>,
    pub previous: Option<EntityId>,
    pub reselected: bool,
    pub effects: Vec<Effect>,
}

#[derive(Error, Debug)]
pub enum ViewerError {
    #[error("no document is ready")]
    NotReady,

    #[error("entity {0} is not a sheet instance")]
    NotASheet(EntityId),

    #[error("no sheet source attached")]
    NoSheetSource,

    #[error(transparent)]
    Unresolved(#[from] UnresolvedSheetError),
}

// ─── Rendering ───────────────────────────────────────────────────────

/// Everything a backend needs to draw the current level.
#[derive(Debug, Clone)]
pub struct Frame<'a> {
    pub document: &'a Document,
    pub path: &'a InstancePath,
    pub depth: usize,
    pub transform: ViewportTransform,
    pub width: f64,
    pub height: f64,
    pub selected: Option<EntityId>,
    /// Padded box of the selection, in world units.
    pub selected_bbox: Option<BBox>,
    pub highlight_all: bool,
}

pub trait Renderer {
    fn redraw(&mut self, frame: &Frame<'_>);
}

/// Renderer that draws nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn redraw(&mut self, _frame: &Frame<'_>) {}
}

// ─── Viewer ──────────────────────────────────────────────────────────

pub type BoxedSource = Box<dyn FnMut(&str) -> Result<Vec<u8>, NotFoundError> + Send>;

/// One document on the hierarchy stack.
struct Level {
    loaded: Arc<Loaded>,
    file: String,
    path: InstancePath,
    hit: HitTester,
    transform: ViewportTransform,
    selected: Option<EntityId>,
}

impl Level {
    fn new(loaded: Arc<Loaded>, file: String, path: InstancePath, options: &ViewerOptions) -> Self {
        let tolerance = options.tolerance(loaded.document.kind());
        let hit = HitTester::new(&loaded.document, tolerance);
        Self {
            loaded,
            file,
            path,
            hit,
            transform: ViewportTransform::default(),
            selected: None,
        }
    }

    fn fit(&mut self, width: f64, height: f64, padding: f64) {
        self.transform = match self.loaded.document.extent() {
            Some(extent) if width > 0.0 && height > 0.0 => {
                ViewportTransform::fit_to_bbox(&extent.grow(padding), width, height)
            }
            _ => ViewportTransform::default(),
        };
    }
}

pub struct Viewer<R> {
    options: ViewerOptions,
    renderer: R,
    state: ViewerState,
    generation: u64,
    levels: Vec<Level>,
    resolver: Option<HierarchyResolver<BoxedSource>>,
    width: f64,
    height: f64,
    redraw_pending: bool,
    highlight_all: bool,
}

impl<R: Renderer> Viewer<R> {
    pub fn new(options: ViewerOptions, renderer: R) -> Self {
        Self {
            options,
            renderer,
            state: ViewerState::Empty,
            generation: 0,
            levels: Vec::new(),
            resolver: None,
            width: 0.0,
            height: 0.0,
            redraw_pending: false,
            highlight_all: false,
        }
    }

    pub fn options(&self) -> &ViewerOptions {
        &self.options
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn state(&self) -> &ViewerState {
        &self.state
    }

    pub fn is_loaded(&self) -> bool {
        self.state == ViewerState::Ready
    }

    // ─── Loading ─────────────────────────────────────────────────────

    /// Start a load. Any load still in flight is superseded.
    pub fn begin_load(&mut self) -> LoadTicket {
        self.generation += 1;
        self.state = ViewerState::Loading;
        log::info!("load #{} started", self.generation);
        LoadTicket(self.generation)
    }

    /// Deliver the result of the load identified by `ticket`.
    pub fn finish_load<E: std::fmt::Display>(
        &mut self,
        ticket: LoadTicket,
        file: impl Into<String>,
        result: Result<Loaded, E>,
    ) -> LoadOutcome {
        if ticket.0 != self.generation {
            log::debug!("discarding load #{} (current #{})", ticket.0, self.generation);
            return LoadOutcome::Superseded;
        }
        match result {
            Ok(loaded) => {
                let loaded = Arc::new(loaded);
                let path = InstancePath::root(&loaded.document);
                let mut level = Level::new(loaded, file.into(), path, &self.options);
                level.fit(self.width, self.height, self.options.fit_padding);
                log::info!(
                    "load #{} ready: {} entities",
                    ticket.0,
                    level.loaded.document.entities.len()
                );
                self.levels = vec![level];
                self.resolver = None;
                self.highlight_all = false;
                self.state = ViewerState::Ready;
                self.request_redraw();
                LoadOutcome::Applied
            }
            Err(err) => {
                log::warn!("load #{} failed: {err}", ticket.0);
                self.levels.clear();
                self.resolver = None;
                self.state = ViewerState::Error(err.to_string());
                LoadOutcome::Failed
            }
        }
    }

    /// Load an already parsed document in one step.
    pub fn load(&mut self, file: impl Into<String>, loaded: Loaded) -> LoadOutcome {
        let ticket = self.begin_load();
        self.finish_load(ticket, file, Ok::<_, Infallible>(loaded))
    }

    /// Supply sub-sheet files for the current root document.
    pub fn attach_sheets<S>(&mut self, mut source: S) -> Result<(), ViewerError>
    where
        S: SheetSource + Send + 'static,
    {
        let root = self.levels.first().ok_or(ViewerError::NotReady)?;
        let boxed: BoxedSource = Box::new(move |file: &str| source.fetch(file));
        self.resolver = Some(HierarchyResolver::new(
            Arc::clone(&root.loaded),
            root.file.clone(),
            boxed,
        ));
        Ok(())
    }

    // ─── Current level ───────────────────────────────────────────────

    fn level(&self) -> Option<&Level> {
        match self.state {
            ViewerState::Ready => self.levels.last(),
            _ => None,
        }
    }

    fn level_mut(&mut self) -> Option<&mut Level> {
        match self.state {
            ViewerState::Ready => self.levels.last_mut(),
            _ => None,
        }
    }

    pub fn document(&self) -> Option<&Document> {
        self.level().map(|l| &l.loaded.document)
    }

    pub fn loaded(&self) -> Option<&Arc<Loaded>> {
        self.level().map(|l| &l.loaded)
    }

    pub fn path(&self) -> Option<&InstancePath> {
        self.level().map(|l| &l.path)
    }

    pub fn file(&self) -> Option<&str> {
        self.level().map(|l| l.file.as_str())
    }

    /// Number of sheets descended below the root.
    pub fn depth(&self) -> usize {
        self.levels.len().saturating_sub(1)
    }

    pub fn selected(&self) -> Option<EntityId> {
        self.level().and_then(|l| l.selected)
    }

    pub fn transform(&self) -> Option<ViewportTransform> {
        self.level().map(|l| l.transform)
    }

    pub fn hit_tester(&self) -> Option<&HitTester> {
        self.level().map(|l| &l.hit)
    }

    // ─── Input ───────────────────────────────────────────────────────

    /// Select whatever lies under a screen point. `None` unless ready.
    pub fn pointer_down(&mut self, x: f64, y: f64) -> Option<SelectionChanged> {
        let level = self.level()?;
        let world = level.transform.screen_to_world(Point::new(x, y));
        let hit = level.hit.hit(world);
        log::debug!("pointer at {world:?} hits {hit:?}");
        self.select(hit)
    }

    /// Change the selection on the current level and run reselect effects.
    pub fn select(&mut self, id: Option<EntityId>) -> Option<SelectionChanged> {
        let level = self.level_mut()?;
        let id = id.filter(|id| level.loaded.document.get(*id).is_some());
        let previous = level.selected;
        level.selected = id;
        let reselected = id.is_some() && id == previous;
        if id != previous {
            self.request_redraw();
        }

        let mut effects = Vec::new();
        if let (true, Some(id)) = (reselected, id) {
            if self.options.details_on_reselect {
                if let Some(details) = self.details(id) {
                    effects.push(Effect::ShowDetails(details));
                }
            }
            if self.options.descend_on_reselect {
                if let Some(effect) = self.descend_effect(id) {
                    effects.push(effect);
                }
            }
        }
        Some(SelectionChanged {
            selected: id,
            previous,
            reselected,
            effects,
        })
    }

    /// Properties of an entity on the current level, in display order.
    pub fn details(&self, id: EntityId) -> Option<Details> {
        let level = self.level()?;
        let doc = &level.loaded.document;
        let entity = doc.get(id)?;
        let reference = match entity {
            Entity::Symbol(s) => doc.reference_for(s, level.path.as_str()),
            Entity::Footprint(f) => f.reference().map(str::to_string),
            _ => None,
        };
        let properties = entity
            .properties()
            .map(|props| {
                properties_by_id(props)
                    .into_iter()
                    .map(|p| (p.name.clone(), p.value.clone()))
                    .collect()
            })
            .unwrap_or_default();
        Some(Details {
            entity: id,
            kind: entity.type_name(),
            uuid: entity.uuid().map(str::to_string),
            reference,
            properties,
        })
    }

    fn descend_effect(&mut self, id: EntityId) -> Option<Effect> {
        let level = self.level()?;
        let Some(Entity::Sheet(sheet)) = level.loaded.document.get(id) else {
            return None;
        };
        let file = sheet.file.clone();
        let sheet_path = level.path.join(&sheet.uuid);
        let outcome = match self.descend(id) {
            Ok(()) => DescendOutcome::Descended,
            Err(ViewerError::NoSheetSource) => DescendOutcome::Deferred,
            Err(ViewerError::Unresolved(err)) => DescendOutcome::Failed(err),
            Err(err) => {
                log::warn!("cannot descend: {err}");
                return None;
            }
        };
        Some(Effect::DescendSheet {
            file,
            sheet_path,
            outcome,
        })
    }

    /// Push the sub-document of a sheet instance as the current level.
    pub fn descend(&mut self, id: EntityId) -> Result<(), ViewerError> {
        let level = self.level().ok_or(ViewerError::NotReady)?;
        let sheet = match level.loaded.document.get(id) {
            Some(Entity::Sheet(s)) => s.clone(),
            _ => return Err(ViewerError::NotASheet(id)),
        };
        let parent = level.path.clone();
        let ancestors: Vec<String> = self.levels.iter().map(|l| l.file.clone()).collect();
        let resolver = self.resolver.as_mut().ok_or(ViewerError::NoSheetSource)?;
        let resolved = resolver.resolve_within(&sheet, &parent, &ancestors)?;
        log::info!("descending into {} at {}", resolved.file, resolved.path);

        let mut child = Level::new(resolved.loaded, resolved.file, resolved.path, &self.options);
        child.fit(self.width, self.height, self.options.fit_padding);
        self.levels.push(child);
        self.highlight_all = false;
        self.request_redraw();
        Ok(())
    }

    /// Return to the parent level. False at the root.
    pub fn ascend(&mut self) -> bool {
        if !self.is_loaded() || self.levels.len() < 2 {
            return false;
        }
        if let Some(level) = self.levels.pop() {
            log::info!("leaving {}", level.path);
        }
        self.request_redraw();
        true
    }

    pub fn highlight_all(&mut self, on: bool) {
        if self.highlight_all != on {
            self.highlight_all = on;
            self.request_redraw();
        }
    }

    pub fn is_highlight_all(&self) -> bool {
        self.highlight_all
    }

    // ─── Viewport ────────────────────────────────────────────────────

    pub fn zoom_at(&mut self, x: f64, y: f64, factor: f64) {
        let (min, max) = self.options.zoom_range();
        if let Some(level) = self.level_mut() {
            level.transform.zoom_at(Point::new(x, y), factor, min, max);
            self.request_redraw();
        }
    }

    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        if let Some(level) = self.level_mut() {
            level.transform.pan_by(dx, dy);
            self.request_redraw();
        }
    }

    /// New canvas size; every level is refitted.
    pub fn resize(&mut self, width: f64, height: f64) {
        if self.width == width && self.height == height {
            return;
        }
        self.width = width;
        self.height = height;
        let padding = self.options.fit_padding;
        for level in &mut self.levels {
            level.fit(width, height, padding);
        }
        self.request_redraw();
    }

    /// Refit the current level to its content.
    pub fn fit(&mut self) {
        let (w, h, padding) = (self.width, self.height, self.options.fit_padding);
        if let Some(level) = self.level_mut() {
            level.fit(w, h, padding);
            self.request_redraw();
        }
    }

    // ─── Redraw ──────────────────────────────────────────────────────

    /// Ask for a redraw; repeated requests before the next flush coalesce.
    pub fn request_redraw(&mut self) {
        self.redraw_pending = true;
    }

    pub fn redraw_pending(&self) -> bool {
        self.redraw_pending
    }

    /// Draw once if a redraw is pending. Returns whether a frame was drawn.
    pub fn flush(&mut self) -> bool {
        if !std::mem::take(&mut self.redraw_pending) {
            return false;
        }
        let depth = self.depth();
        let Some(level) = (match self.state {
            ViewerState::Ready => self.levels.last(),
            _ => None,
        }) else {
            return false;
        };
        let frame = Frame {
            document: &level.loaded.document,
            path: &level.path,
            depth,
            transform: level.transform,
            width: self.width,
            height: self.height,
            selected: level.selected,
            selected_bbox: level.selected.and_then(|id| level.hit.bbox(id)),
            highlight_all: self.highlight_all,
        };
        self.renderer.redraw(&frame);
        true
    }
}
