// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod map;

use anyhow::{Context, Result, anyhow};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyModifiers,
    MouseButton, MouseEvent, MouseEventKind,
};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{execute, terminal};
use geoview_app::{
    AppCommand, AppEvent, AppState, AttributeTable, BackendRequest, BusListener, Extent,
    ExtentOrigin, FeatureIndex, FeaturePanel, Field, Highlight, Layer, LayerId, RequestId,
    SelectionSummary, SortDirection, SortSpec, TableData, TableWindow, WindowId,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::symbols::Marker;
use ratatui::text::{Line, Span};
use ratatui::widgets::canvas::{Canvas, Map as WorldMap, MapResolution, Points};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table};
use std::collections::VecDeque;
use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::map::MapView;

pub const DEFAULT_HIT_TOLERANCE_CELLS: f64 = 1.0;
pub const DEFAULT_ZOOM_STEP: f64 = 0.5;
pub const DEFAULT_OVERSCAN_ROWS: usize = geoview_app::DEFAULT_OVERSCAN_ROWS;

const SIDE_PANEL_WIDTH: u16 = 34;
const FEATURE_PANEL_HEIGHT: u16 = 10;
const PAN_STEP_CELLS: i32 = 4;
const NOTICE_TTL: Duration = Duration::from_secs(4);
const CHECK_ALL: &str = "[x]";
const CHECK_SOME: &str = "[-]";
const CHECK_NONE: &str = "[ ]";
const SORT_ASC: &str = "▲";
const SORT_DESC: &str = "▼";
const SWATCH: &str = "●";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UiOptions {
    pub hit_tolerance_cells: f64,
    pub zoom_step: f64,
    pub overscan_rows: usize,
}

impl Default for UiOptions {
    fn default() -> Self {
        Self {
            hit_tolerance_cells: DEFAULT_HIT_TOLERANCE_CELLS,
            zoom_step: DEFAULT_ZOOM_STEP,
            overscan_rows: DEFAULT_OVERSCAN_ROWS,
        }
    }
}

/// Backend command surface. Fire-and-forget commands return once the
/// backend accepted them; their effects come back over the bus.
pub trait AppRuntime {
    fn delete_layer(&mut self, layer_id: &LayerId) -> Result<()>;
    fn get_feature_attributes(
        &mut self,
        layer_id: &LayerId,
        feature_id: FeatureIndex,
    ) -> Result<Vec<Field>>;
    fn get_layer_attributes(&mut self, layer_id: &LayerId, sort: SortSpec)
    -> Result<AttributeTable>;
    /// Subscribes a new table window to the bus.
    fn create_table_window(&mut self, layer_id: &LayerId) -> Result<BusListener>;
    fn select_feature(&mut self, layer_id: &LayerId, feature_id: FeatureIndex) -> Result<()>;
    fn unselect_feature(&mut self, layer_id: &LayerId, feature_id: FeatureIndex) -> Result<()>;
    fn select_all_features(&mut self, layer_id: &LayerId) -> Result<()>;
    fn unselect_all_features(&mut self, layer_id: &LayerId) -> Result<()>;
    fn zoom_to_feature(&mut self, layer_id: &LayerId, feature_id: FeatureIndex) -> Result<()>;

    fn spawn_feature_attributes(
        &mut self,
        request_id: RequestId,
        layer_id: &LayerId,
        feature_id: FeatureIndex,
        tx: Sender<InternalEvent>,
    ) -> Result<()> {
        let result = self
            .get_feature_attributes(layer_id, feature_id)
            .map_err(|error| format!("{error:#}"));
        tx.send(InternalEvent::FeatureAttributes { request_id, result })
            .map_err(|_| anyhow!("internal event channel closed"))
    }

    fn spawn_layer_attributes(
        &mut self,
        window_id: WindowId,
        request_id: RequestId,
        layer_id: &LayerId,
        sort: SortSpec,
        tx: Sender<InternalEvent>,
    ) -> Result<()> {
        let result = self
            .get_layer_attributes(layer_id, sort)
            .map_err(|error| format!("{error:#}"));
        tx.send(InternalEvent::LayerAttributes {
            window_id,
            request_id,
            sort,
            result,
        })
        .map_err(|_| anyhow!("internal event channel closed"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InternalEvent {
    ClearNotice {
        token: u64,
    },
    FeatureAttributes {
        request_id: RequestId,
        result: std::result::Result<Vec<Field>, String>,
    },
    LayerAttributes {
        window_id: WindowId,
        request_id: RequestId,
        sort: SortSpec,
        result: std::result::Result<AttributeTable, String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Focus {
    #[default]
    Map,
    Layers,
    Table(WindowId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    ZoomToLayer,
    AttributeTable,
    DeleteLayer,
}

impl MenuAction {
    pub const ALL: [Self; 3] = [Self::ZoomToLayer, Self::AttributeTable, Self::DeleteLayer];

    pub const fn label(self) -> &'static str {
        match self {
            Self::ZoomToLayer => "zoom to layer",
            Self::AttributeTable => "attribute table",
            Self::DeleteLayer => "delete layer",
        }
    }

    fn command(self, layer_id: LayerId) -> AppCommand {
        match self {
            Self::ZoomToLayer => AppCommand::ZoomToLayer(layer_id),
            Self::AttributeTable => AppCommand::OpenAttributeTable(layer_id),
            Self::DeleteLayer => AppCommand::DeleteLayer(layer_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LayerMenu {
    layer_id: LayerId,
    cursor: usize,
}

#[derive(Debug)]
struct WindowView {
    table: TableWindow,
    listener: BusListener,
    cursor_row: usize,
    cursor_column: usize,
}

impl WindowView {
    fn clamp_cursor(&mut self) {
        self.cursor_row = self
            .cursor_row
            .min(self.table.row_count().saturating_sub(1));
        self.cursor_column = self
            .cursor_column
            .min(self.table.columns().len().saturating_sub(1));
        let total = self.table.row_count();
        self.table.scroll.ensure_visible(self.cursor_row, total);
    }

    fn move_row(&mut self, delta: isize) {
        let last = self.table.row_count().saturating_sub(1);
        self.cursor_row = self.cursor_row.saturating_add_signed(delta).min(last);
        let total = self.table.row_count();
        self.table.scroll.ensure_visible(self.cursor_row, total);
    }
}

#[derive(Debug, Default)]
struct ViewData {
    options: UiOptions,
    map: MapView,
    screen: Rect,
    focus: Focus,
    layer_cursor: usize,
    menu: Option<LayerMenu>,
    map_pointer: Option<(u16, u16)>,
    drag_from: Option<(u16, u16)>,
    windows: Vec<WindowView>,
    next_window: u64,
    notice_token: u64,
    last_gesture: Option<Extent>,
    help_visible: bool,
}

impl ViewData {
    fn new(options: UiOptions, extent: Extent) -> Self {
        Self {
            options,
            map: MapView::new(extent),
            ..Self::default()
        }
    }

    fn window_index(&self, window_id: WindowId) -> Option<usize> {
        self.windows
            .iter()
            .position(|view| view.table.id() == window_id)
    }

    fn map_area(&self) -> Rect {
        map_inner(screen_layout(self.screen).map)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScreenLayout {
    layers: Rect,
    feature: Rect,
    map: Rect,
    status: Rect,
}

fn screen_layout(area: Rect) -> ScreenLayout {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(3)])
        .split(area);
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(SIDE_PANEL_WIDTH), Constraint::Min(1)])
        .split(rows[0]);
    let side = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),
            Constraint::Length(FEATURE_PANEL_HEIGHT),
        ])
        .split(columns[0]);
    ScreenLayout {
        layers: side[0],
        feature: side[1],
        map: columns[1],
        status: rows[1],
    }
}

fn map_inner(area: Rect) -> Rect {
    Block::default().borders(Borders::ALL).inner(area)
}

fn table_window_area(screen: Rect) -> Rect {
    centered_rect(90, 70, screen)
}

/// Rows available for table body: overlay minus borders and header.
fn table_body_height(screen: Rect) -> u32 {
    u32::from(table_window_area(screen).height.saturating_sub(3))
}

pub fn run_app<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    main_bus: &BusListener,
    options: UiOptions,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, terminal::EnterAlternateScreen, EnableMouseCapture)
        .context("enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let mut view_data = ViewData::new(options, state.viewport.current());
    let (internal_tx, internal_rx) = mpsc::channel();

    let mut result = Ok(());
    loop {
        match terminal.size() {
            Ok(size) => view_data.screen = Rect::new(0, 0, size.width, size.height),
            Err(error) => {
                result = Err(error).context("read terminal size");
                break;
            }
        }
        pump(
            state,
            runtime,
            &mut view_data,
            &internal_tx,
            &internal_rx,
            main_bus,
        );
        sync_table_viewports(&mut view_data);

        if let Err(error) = terminal.draw(|frame| render(frame, state, &view_data)) {
            result = Err(error).context("draw frame");
            break;
        }

        let has_event = event::poll(Duration::from_millis(120)).context("poll event")?;
        if has_event {
            match event::read().context("read event")? {
                Event::Key(key) => {
                    if handle_key_event(state, runtime, &mut view_data, &internal_tx, key) {
                        break;
                    }
                }
                Event::Mouse(mouse) => {
                    handle_mouse_event(state, runtime, &mut view_data, &internal_tx, mouse);
                }
                Event::Resize(_, _) => {}
                _ => {}
            }
        }
        state.end_cycle();
    }

    disable_raw_mode().context("disable raw mode")?;
    execute!(
        io::stdout(),
        terminal::LeaveAlternateScreen,
        DisableMouseCapture
    )
    .context("leave alternate screen")?;
    result
}

/// Applies everything that arrived asynchronously since the last frame.
fn pump<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    rx: &Receiver<InternalEvent>,
    main_bus: &BusListener,
) {
    process_internal_events(state, runtime, view_data, tx, rx);
    for message in main_bus.drain() {
        let events = state.dispatch(AppCommand::Bus(message));
        apply_events(state, runtime, view_data, tx, events);
    }
    drain_window_buses(view_data);
}

fn drain_window_buses(view_data: &mut ViewData) {
    for view in &mut view_data.windows {
        for message in view.listener.drain() {
            if let Err(error) = view.table.apply_message(&message) {
                debug!(window = %view.table.id(), %error, "ignore bus message");
            }
        }
        view.clamp_cursor();
    }

    let before = view_data.windows.len();
    view_data.windows.retain(|view| !view.table.is_closed());
    if view_data.windows.len() != before {
        info!(closed = before - view_data.windows.len(), "closed table windows");
    }
    if let Focus::Table(window_id) = view_data.focus
        && view_data.window_index(window_id).is_none()
    {
        view_data.focus = Focus::Layers;
    }
}

fn process_internal_events<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    rx: &Receiver<InternalEvent>,
) {
    while let Ok(event) = rx.try_recv() {
        let events = match event {
            InternalEvent::ClearNotice { token } if token == view_data.notice_token => {
                state.dispatch(AppCommand::DismissNotice)
            }
            InternalEvent::ClearNotice { .. } => Vec::new(),
            InternalEvent::FeatureAttributes {
                request_id,
                result: Ok(fields),
            } => state.dispatch(AppCommand::FeatureAttributesLoaded { request_id, fields }),
            InternalEvent::FeatureAttributes {
                result: Err(error), ..
            } => state.dispatch(AppCommand::BackendFailed(format!(
                "load feature attributes: {error}"
            ))),
            InternalEvent::LayerAttributes {
                window_id,
                request_id,
                sort,
                result,
            } => apply_layer_attributes(state, view_data, window_id, request_id, sort, result),
        };
        apply_events(state, runtime, view_data, tx, events);
    }
}

fn apply_layer_attributes(
    state: &mut AppState,
    view_data: &mut ViewData,
    window_id: WindowId,
    request_id: RequestId,
    sort: SortSpec,
    result: std::result::Result<AttributeTable, String>,
) -> Vec<AppEvent> {
    let Some(index) = view_data.window_index(window_id) else {
        debug!(window = %window_id, "attribute table for closed window");
        return Vec::new();
    };
    let view = &mut view_data.windows[index];
    match result {
        Ok(table) => {
            if let Err(error) = view.table.apply_response(request_id, sort, table) {
                debug!(window = %window_id, %error, "discard attribute table");
            }
            view.clamp_cursor();
            Vec::new()
        }
        Err(error) => {
            view.table.fetch_failed(request_id);
            state.dispatch(AppCommand::BackendFailed(format!(
                "load attribute table: {error}"
            )))
        }
    }
}

fn apply_events<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    events: Vec<AppEvent>,
) {
    let mut queue = VecDeque::from(events);
    while let Some(event) = queue.pop_front() {
        match event {
            AppEvent::LayersChanged { version } => {
                debug!(version, "layers changed");
                view_data.layer_cursor = view_data
                    .layer_cursor
                    .min(state.layers.len().saturating_sub(1));
                if view_data
                    .menu
                    .as_ref()
                    .is_some_and(|menu| state.layers.get(&menu.layer_id).is_none())
                {
                    view_data.menu = None;
                }
            }
            AppEvent::ExtentChanged {
                extent,
                origin: ExtentOrigin::Map,
            } => view_data.last_gesture = Some(extent),
            AppEvent::ExtentChanged {
                origin: ExtentOrigin::Binding,
                ..
            } => {}
            AppEvent::ForwardExtent(extent) => {
                let reported = view_data.map.apply_forward(extent);
                queue.extend(state.dispatch(AppCommand::MapExtentChanged(reported)));
            }
            AppEvent::Request(request) => {
                queue.extend(execute_request(state, runtime, view_data, tx, None, request));
            }
            AppEvent::NoticeUpdated(message) => {
                debug!(%message, "notice");
                view_data.notice_token = view_data.notice_token.saturating_add(1);
                schedule_notice_clear(tx, view_data.notice_token);
            }
            AppEvent::Rejected(error) => debug!(%error, "command rejected"),
            AppEvent::HighlightChanged(_)
            | AppEvent::FeaturePanelChanged
            | AppEvent::NoticeCleared => {}
        }
    }
}

fn schedule_notice_clear(internal_tx: &Sender<InternalEvent>, token: u64) {
    let sender = internal_tx.clone();
    thread::spawn(move || {
        thread::sleep(NOTICE_TTL);
        let _ = sender.send(InternalEvent::ClearNotice { token });
    });
}

/// Sends one backend command. Failures leave local state alone and become a
/// notice. `origin` is the table window that issued the request, if any.
fn execute_request<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    origin: Option<WindowId>,
    request: BackendRequest,
) -> Vec<AppEvent> {
    let name = request.name();
    let outcome = match request {
        BackendRequest::DeleteLayer { layer_id } => runtime.delete_layer(&layer_id),
        BackendRequest::GetFeatureAttributes {
            request_id,
            layer_id,
            feature_id,
        } => runtime.spawn_feature_attributes(request_id, &layer_id, feature_id, tx.clone()),
        BackendRequest::GetLayerAttributes {
            request_id,
            layer_id,
            sort,
        } => match origin {
            Some(window_id) => {
                runtime.spawn_layer_attributes(window_id, request_id, &layer_id, sort, tx.clone())
            }
            None => {
                debug!(%layer_id, "layer attributes requested without a window");
                Ok(())
            }
        },
        BackendRequest::CreateTableWindow { layer_id } => {
            match open_table_window(runtime, view_data, layer_id) {
                Ok((window_id, fetch)) => {
                    return execute_request(state, runtime, view_data, tx, Some(window_id), fetch);
                }
                Err(error) => Err(error),
            }
        }
        BackendRequest::SelectFeature {
            layer_id,
            feature_id,
        } => runtime.select_feature(&layer_id, feature_id),
        BackendRequest::UnselectFeature {
            layer_id,
            feature_id,
        } => runtime.unselect_feature(&layer_id, feature_id),
        BackendRequest::SelectAllFeatures { layer_id } => runtime.select_all_features(&layer_id),
        BackendRequest::UnselectAllFeatures { layer_id } => {
            runtime.unselect_all_features(&layer_id)
        }
        BackendRequest::ZoomToFeature {
            layer_id,
            feature_id,
        } => runtime.zoom_to_feature(&layer_id, feature_id),
    };

    match outcome {
        Ok(()) => Vec::new(),
        Err(error) => {
            warn!(request = name, error = %format!("{error:#}"), "backend request failed");
            state.dispatch(AppCommand::BackendFailed(format!("{name} failed: {error}")))
        }
    }
}

fn open_table_window<R: AppRuntime>(
    runtime: &mut R,
    view_data: &mut ViewData,
    layer_id: LayerId,
) -> Result<(WindowId, BackendRequest)> {
    let listener = runtime.create_table_window(&layer_id)?;
    view_data.next_window = view_data.next_window.saturating_add(1);
    let window_id = WindowId::new(view_data.next_window);

    let mut table = TableWindow::new(window_id, layer_id.clone());
    table.scroll.overscan = view_data.options.overscan_rows;
    table.scroll.viewport_height = table_body_height(view_data.screen);
    let fetch = table.open();
    view_data.windows.push(WindowView {
        table,
        listener,
        cursor_row: 0,
        cursor_column: 0,
    });
    view_data.focus = Focus::Table(window_id);
    info!(window = %window_id, %layer_id, "opened attribute table");
    Ok((window_id, fetch))
}

fn sync_table_viewports(view_data: &mut ViewData) {
    let height = table_body_height(view_data.screen);
    for view in &mut view_data.windows {
        let total = view.table.row_count();
        view.table.scroll.set_viewport_height(height, total);
        view.table.scroll.ensure_visible(view.cursor_row, total);
    }
}

fn dispatch_and_apply<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    command: AppCommand,
) {
    let events = state.dispatch(command);
    apply_events(state, runtime, view_data, tx, events);
}

fn handle_key_event<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    if key.modifiers.contains(KeyModifiers::CONTROL)
        && matches!(key.code, KeyCode::Char('q') | KeyCode::Char('c'))
    {
        return true;
    }

    if view_data.help_visible {
        if matches!(key.code, KeyCode::Esc | KeyCode::Char('?')) {
            view_data.help_visible = false;
        }
        return false;
    }

    if view_data.menu.is_some() {
        handle_menu_key(state, runtime, view_data, internal_tx, key);
        return false;
    }

    match key.code {
        KeyCode::Char('?') => {
            view_data.help_visible = true;
            return false;
        }
        KeyCode::Tab => {
            cycle_focus(view_data, 1);
            return false;
        }
        KeyCode::BackTab => {
            cycle_focus(view_data, -1);
            return false;
        }
        KeyCode::Char('q') if !matches!(view_data.focus, Focus::Table(_)) => return true,
        KeyCode::Esc if state.notice.is_some() => {
            dispatch_and_apply(
                state,
                runtime,
                view_data,
                internal_tx,
                AppCommand::DismissNotice,
            );
            return false;
        }
        _ => {}
    }

    match view_data.focus {
        Focus::Map => handle_map_key(state, runtime, view_data, internal_tx, key),
        Focus::Layers => handle_layers_key(state, runtime, view_data, internal_tx, key),
        Focus::Table(window_id) => {
            handle_table_key(state, runtime, view_data, internal_tx, window_id, key);
        }
    }
    false
}

fn cycle_focus(view_data: &mut ViewData, delta: isize) {
    let mut order = vec![Focus::Map, Focus::Layers];
    order.extend(
        view_data
            .windows
            .iter()
            .map(|view| Focus::Table(view.table.id())),
    );
    let current = order
        .iter()
        .position(|focus| *focus == view_data.focus)
        .unwrap_or(0) as isize;
    let next = (current + delta).rem_euclid(order.len() as isize) as usize;
    view_data.focus = order[next];
}

fn handle_map_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let area = view_data.map_area();
    let gesture = match key.code {
        KeyCode::Left => Some(view_data.map.panned(area, -PAN_STEP_CELLS, 0)),
        KeyCode::Right => Some(view_data.map.panned(area, PAN_STEP_CELLS, 0)),
        KeyCode::Up => Some(view_data.map.panned(area, 0, -PAN_STEP_CELLS)),
        KeyCode::Down => Some(view_data.map.panned(area, 0, PAN_STEP_CELLS)),
        KeyCode::Char('+') | KeyCode::Char('=') => {
            Some(view_data.map.zoomed(view_data.options.zoom_step))
        }
        KeyCode::Char('-') => Some(view_data.map.zoomed(1.0 / view_data.options.zoom_step)),
        _ => None,
    };
    if let Some(extent) = gesture {
        map_gesture(state, runtime, view_data, internal_tx, extent);
        return;
    }

    let (dx, dy) = match key.code {
        KeyCode::Char('h') => (-1, 0),
        KeyCode::Char('l') => (1, 0),
        KeyCode::Char('k') => (0, -1),
        KeyCode::Char('j') => (0, 1),
        KeyCode::Enter | KeyCode::Char(' ') => {
            if let Some((column, row)) = view_data.map_pointer {
                map_click(state, runtime, view_data, internal_tx, column, row);
            }
            return;
        }
        _ => return,
    };
    let (column, row) = view_data
        .map_pointer
        .unwrap_or((area.x + area.width / 2, area.y + area.height / 2));
    let column = column
        .saturating_add_signed(dx)
        .clamp(area.x, (area.x + area.width).saturating_sub(1));
    let row = row
        .saturating_add_signed(dy)
        .clamp(area.y, (area.y + area.height).saturating_sub(1));
    view_data.map_pointer = Some((column, row));
    map_hover(state, runtime, view_data, internal_tx, column, row);
}

fn map_gesture<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    extent: Extent,
) {
    let reported = view_data.map.gesture(extent);
    dispatch_and_apply(
        state,
        runtime,
        view_data,
        internal_tx,
        AppCommand::MapExtentChanged(reported),
    );
}

fn map_hover<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    column: u16,
    row: u16,
) {
    let area = view_data.map_area();
    let Some(at) = view_data.map.cell_to_point(area, column, row) else {
        return;
    };
    let tolerance = view_data
        .map
        .tolerance(area, view_data.options.hit_tolerance_cells);
    dispatch_and_apply(
        state,
        runtime,
        view_data,
        internal_tx,
        AppCommand::PointerMoved { at, tolerance },
    );
}

fn map_click<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    column: u16,
    row: u16,
) {
    let area = view_data.map_area();
    let Some(at) = view_data.map.cell_to_point(area, column, row) else {
        return;
    };
    let tolerance = view_data
        .map
        .tolerance(area, view_data.options.hit_tolerance_cells);
    dispatch_and_apply(
        state,
        runtime,
        view_data,
        internal_tx,
        AppCommand::MapClicked { at, tolerance },
    );
}

fn selected_layer_id(state: &AppState, view_data: &ViewData) -> Option<LayerId> {
    state
        .layers
        .layers()
        .get(view_data.layer_cursor)
        .map(|layer| layer.id.clone())
}

fn handle_layers_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let last = state.layers.len().saturating_sub(1);
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => {
            view_data.layer_cursor = (view_data.layer_cursor + 1).min(last);
            return;
        }
        KeyCode::Char('k') | KeyCode::Up => {
            view_data.layer_cursor = view_data.layer_cursor.saturating_sub(1);
            return;
        }
        _ => {}
    }

    let Some(layer_id) = selected_layer_id(state, view_data) else {
        return;
    };
    let command = match key.code {
        KeyCode::Char('J') => {
            view_data.layer_cursor = (view_data.layer_cursor + 1).min(last);
            AppCommand::MoveLayer { layer_id, delta: 1 }
        }
        KeyCode::Char('K') => {
            view_data.layer_cursor = view_data.layer_cursor.saturating_sub(1);
            AppCommand::MoveLayer {
                layer_id,
                delta: -1,
            }
        }
        KeyCode::Char(' ') | KeyCode::Char('v') => AppCommand::ToggleVisible(layer_id),
        KeyCode::Char('c') => AppCommand::CycleColor(layer_id),
        KeyCode::Char('z') => MenuAction::ZoomToLayer.command(layer_id),
        KeyCode::Char('t') => MenuAction::AttributeTable.command(layer_id),
        KeyCode::Char('d') => MenuAction::DeleteLayer.command(layer_id),
        KeyCode::Enter | KeyCode::Char('m') => {
            view_data.menu = Some(LayerMenu {
                layer_id,
                cursor: 0,
            });
            return;
        }
        _ => return,
    };
    dispatch_and_apply(state, runtime, view_data, internal_tx, command);
}

fn handle_menu_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let Some(menu) = view_data.menu.as_mut() else {
        return;
    };
    match key.code {
        KeyCode::Esc => view_data.menu = None,
        KeyCode::Char('j') | KeyCode::Down => {
            menu.cursor = (menu.cursor + 1).min(MenuAction::ALL.len() - 1);
        }
        KeyCode::Char('k') | KeyCode::Up => menu.cursor = menu.cursor.saturating_sub(1),
        KeyCode::Enter => {
            let action = MenuAction::ALL[menu.cursor];
            let layer_id = menu.layer_id.clone();
            view_data.menu = None;
            dispatch_and_apply(
                state,
                runtime,
                view_data,
                internal_tx,
                action.command(layer_id),
            );
        }
        _ => {}
    }
}

fn handle_table_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    window_id: WindowId,
    key: KeyEvent,
) {
    let Some(index) = view_data.window_index(window_id) else {
        view_data.focus = Focus::Layers;
        return;
    };
    let page = view_data.windows[index].table.scroll.viewport_height.max(1) as isize;
    let view = &mut view_data.windows[index];
    let request = match key.code {
        KeyCode::Char('j') | KeyCode::Down => {
            view.move_row(1);
            None
        }
        KeyCode::Char('k') | KeyCode::Up => {
            view.move_row(-1);
            None
        }
        KeyCode::PageDown => {
            view.move_row(page);
            None
        }
        KeyCode::PageUp => {
            view.move_row(-page);
            None
        }
        KeyCode::Char('g') => {
            view.move_row(isize::MIN / 2);
            None
        }
        KeyCode::Char('G') => {
            view.move_row(isize::MAX / 2);
            None
        }
        KeyCode::Char('h') | KeyCode::Left => {
            view.cursor_column = view.cursor_column.saturating_sub(1);
            None
        }
        KeyCode::Char('l') | KeyCode::Right => {
            view.cursor_column =
                (view.cursor_column + 1).min(view.table.columns().len().saturating_sub(1));
            None
        }
        KeyCode::Char('s') => view.table.click_header(view.cursor_column),
        KeyCode::Char('r') => view.table.retry(),
        KeyCode::Char(' ') => view.table.toggle_row(view.cursor_row),
        KeyCode::Char('a') => {
            if matches!(view.table.data(), TableData::Pending) {
                None
            } else {
                Some(view.table.click_select_all())
            }
        }
        KeyCode::Enter => view.table.click_row(view.cursor_row),
        KeyCode::Char('x') | KeyCode::Esc => {
            info!(window = %window_id, "closed attribute table");
            view_data.windows.remove(index);
            view_data.focus = Focus::Layers;
            None
        }
        _ => None,
    };
    if let Some(request) = request {
        let events = execute_request(
            state,
            runtime,
            view_data,
            internal_tx,
            Some(window_id),
            request,
        );
        apply_events(state, runtime, view_data, internal_tx, events);
    }
}

fn handle_mouse_event<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    mouse: MouseEvent,
) {
    let area = view_data.map_area();
    let (column, row) = (mouse.column, mouse.row);
    let in_map = view_data.map.cell_to_point(area, column, row).is_some();

    if let Focus::Table(window_id) = view_data.focus
        && table_window_area(view_data.screen).contains((column, row).into())
    {
        if let Some(index) = view_data.window_index(window_id) {
            match mouse.kind {
                MouseEventKind::ScrollDown => view_data.windows[index].move_row(3),
                MouseEventKind::ScrollUp => view_data.windows[index].move_row(-3),
                _ => {}
            }
        }
        return;
    }

    match mouse.kind {
        MouseEventKind::Moved if in_map => {
            map_hover(state, runtime, view_data, internal_tx, column, row);
        }
        MouseEventKind::Down(MouseButton::Left) if in_map => {
            view_data.focus = Focus::Map;
            view_data.drag_from = Some((column, row));
            map_click(state, runtime, view_data, internal_tx, column, row);
        }
        MouseEventKind::Drag(MouseButton::Left) => {
            if let Some((from_column, from_row)) = view_data.drag_from {
                let dx = i32::from(from_column) - i32::from(column);
                let dy = i32::from(from_row) - i32::from(row);
                view_data.drag_from = Some((column, row));
                if dx != 0 || dy != 0 {
                    let extent = view_data.map.panned(area, dx, dy);
                    map_gesture(state, runtime, view_data, internal_tx, extent);
                }
            }
        }
        MouseEventKind::Up(MouseButton::Left) => view_data.drag_from = None,
        MouseEventKind::ScrollUp | MouseEventKind::ScrollDown if in_map => {
            let factor = if mouse.kind == MouseEventKind::ScrollUp {
                view_data.options.zoom_step
            } else {
                1.0 / view_data.options.zoom_step
            };
            if let Some(anchor) = view_data.map.cell_to_point(area, column, row) {
                let extent = view_data.map.zoomed_at(anchor, factor);
                map_gesture(state, runtime, view_data, internal_tx, extent);
            }
        }
        _ => {}
    }
}

fn render(frame: &mut ratatui::Frame<'_>, state: &AppState, view_data: &ViewData) {
    let layout = screen_layout(frame.area());

    let layers = Paragraph::new(layer_list_lines(state, view_data)).block(
        Block::default()
            .borders(Borders::ALL)
            .title("layers")
            .border_style(focus_style(view_data.focus == Focus::Layers)),
    );
    frame.render_widget(layers, layout.layers);

    let feature = Paragraph::new(feature_panel_text(state))
        .block(Block::default().borders(Borders::ALL).title("feature"));
    frame.render_widget(feature, layout.feature);

    render_map(frame, layout.map, state, view_data);

    let status = Paragraph::new(status_text(state, view_data))
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(status, layout.status);

    if let Focus::Table(window_id) = view_data.focus
        && let Some(index) = view_data.window_index(window_id)
    {
        render_table_window(frame, state, view_data, index);
    }

    if let Some(menu) = &view_data.menu {
        let area = centered_rect(30, 20, frame.area());
        frame.render_widget(Clear, area);
        let menu_widget = Paragraph::new(layer_menu_text(menu.cursor))
            .block(Block::default().borders(Borders::ALL).title("layer"));
        frame.render_widget(menu_widget, area);
    }

    if view_data.help_visible {
        let area = centered_rect(70, 60, frame.area());
        frame.render_widget(Clear, area);
        let help = Paragraph::new(help_overlay_text())
            .block(Block::default().borders(Borders::ALL).title("help"));
        frame.render_widget(help, area);
    }
}

fn focus_style(focused: bool) -> Style {
    if focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    }
}

fn layer_color(layer: &Layer) -> Color {
    let (r, g, b) = layer.color.rgb();
    Color::Rgb(r, g, b)
}

fn render_map(
    frame: &mut ratatui::Frame<'_>,
    area: Rect,
    state: &AppState,
    view_data: &ViewData,
) {
    let extent = view_data.map.extent();
    let highlight = state.highlight.current().active().and_then(|feature| {
        state
            .layers
            .get(&feature.layer_id)
            .filter(|layer| layer.visible)
            .and_then(|layer| layer.points.get(feature.feature.get()))
            .map(|point| (point.lng, point.lat))
    });
    let pointer = view_data.map_pointer.and_then(|(column, row)| {
        view_data
            .map
            .cell_to_point(view_data.map_area(), column, row)
            .map(|point| (point.lng, point.lat))
    });

    let canvas = Canvas::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(map_title(extent))
                .border_style(focus_style(view_data.focus == Focus::Map)),
        )
        .marker(Marker::Braille)
        .x_bounds([extent.west, extent.east])
        .y_bounds([extent.south, extent.north])
        .paint(|ctx| {
            ctx.draw(&WorldMap {
                color: Color::DarkGray,
                resolution: MapResolution::Low,
            });
            // Index 0 is on top, so paint from the bottom of the list up.
            for layer in state.layers.layers().iter().rev().filter(|layer| layer.visible) {
                ctx.layer();
                let coords = layer
                    .points
                    .iter()
                    .map(|point| (point.lng, point.lat))
                    .collect::<Vec<_>>();
                ctx.draw(&Points {
                    coords: &coords,
                    color: layer_color(layer),
                });
            }
            if let Some(coords) = highlight {
                ctx.layer();
                ctx.print(
                    coords.0,
                    coords.1,
                    Span::styled(
                        "◉",
                        Style::default()
                            .fg(Color::White)
                            .add_modifier(Modifier::BOLD),
                    ),
                );
            }
            if let Some(coords) = pointer {
                ctx.print(
                    coords.0,
                    coords.1,
                    Span::styled("+", Style::default().fg(Color::Yellow)),
                );
            }
        });
    frame.render_widget(canvas, area);
}

fn map_title(extent: Extent) -> String {
    format!(
        "map {:.2},{:.2} .. {:.2},{:.2}",
        extent.west, extent.south, extent.east, extent.north
    )
}

fn layer_row_text(layer: &Layer, cursor: bool) -> String {
    let marker = if cursor { ">" } else { " " };
    let visible = if layer.visible { CHECK_ALL } else { CHECK_NONE };
    format!(
        "{marker}{visible} {SWATCH} {} ({})",
        layer.title,
        layer.points.len()
    )
}

fn layer_list_lines(state: &AppState, view_data: &ViewData) -> Vec<Line<'static>> {
    if state.layers.is_empty() {
        return vec![Line::from("no layers; pass CSV files on the command line")];
    }
    state
        .layers
        .layers()
        .iter()
        .enumerate()
        .map(|(index, layer)| {
            let text = layer_row_text(layer, index == view_data.layer_cursor);
            let style = if layer.visible {
                Style::default()
            } else {
                Style::default().fg(Color::DarkGray)
            };
            match text.split_once(SWATCH) {
                Some((prefix, rest)) => Line::from(vec![
                    Span::styled(prefix.to_owned(), style),
                    Span::styled(SWATCH, Style::default().fg(layer_color(layer))),
                    Span::styled(rest.to_owned(), style),
                ]),
                None => Line::styled(text, style),
            }
        })
        .collect()
}

fn feature_panel_text(state: &AppState) -> String {
    let title_of = |layer_id: &LayerId| {
        state
            .layers
            .get(layer_id)
            .map_or_else(|| layer_id.to_string(), |layer| layer.title.clone())
    };
    let mut lines = Vec::new();
    if let Highlight::Active(feature) = state.highlight.current() {
        lines.push(format!(
            "hover: {} #{}",
            title_of(&feature.layer_id),
            feature.feature
        ));
    }
    match &state.feature_panel {
        FeaturePanel::Empty => lines.push("click a feature to see its attributes".to_owned()),
        FeaturePanel::Loading { feature, .. } => lines.push(format!(
            "loading {} #{}...",
            title_of(&feature.layer_id),
            feature.feature
        )),
        FeaturePanel::Loaded { feature, fields } => {
            lines.push(format!("{} #{}", title_of(&feature.layer_id), feature.feature));
            lines.extend(
                fields
                    .iter()
                    .map(|field| format!("{}: {}", field.name, field.value)),
            );
        }
    }
    lines.join("\n")
}

fn layer_menu_text(cursor: usize) -> String {
    MenuAction::ALL
        .iter()
        .enumerate()
        .map(|(index, action)| {
            let marker = if index == cursor { ">" } else { " " };
            format!("{marker} {}", action.label())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn selection_mark(summary: SelectionSummary) -> &'static str {
    match summary {
        SelectionSummary::None => CHECK_NONE,
        SelectionSummary::Some => CHECK_SOME,
        SelectionSummary::All => CHECK_ALL,
    }
}

fn header_label(table: &TableWindow, column: usize) -> String {
    let name = table.columns().get(column).cloned().unwrap_or_default();
    let sort = table.sort();
    if sort.column != column {
        return name;
    }
    let arrow = match sort.direction {
        SortDirection::Asc => SORT_ASC,
        SortDirection::Desc => SORT_DESC,
    };
    format!("{name}{arrow}")
}

fn table_window_title(state: &AppState, view_data: &ViewData, index: usize) -> String {
    let view = &view_data.windows[index];
    let title = state
        .layers
        .get(view.table.layer_id())
        .map_or_else(|| view.table.layer_id().to_string(), |layer| layer.title.clone());
    let loading = if view.table.is_loading() {
        " loading..."
    } else {
        ""
    };
    format!(
        "{title} ({}/{}) {} rows{loading}",
        index + 1,
        view_data.windows.len(),
        view.table.row_count()
    )
}

const LOAD_FAILED_TEXT: &str = "load failed; press r to retry";

/// Plain-text rendition of the materialized part of a table window.
fn table_window_text(view: &WindowView) -> String {
    let table = &view.table;
    if table.load_failed() {
        return LOAD_FAILED_TEXT.to_owned();
    }
    if matches!(table.data(), TableData::Pending) {
        return "loading...".to_owned();
    }
    let mut header = vec![selection_mark(table.selection_summary()).to_owned()];
    header.extend((0..table.columns().len()).map(|column| header_label(table, column)));
    let mut lines = vec![header.join(" | ")];
    for (position, row, selected) in table.visible_rows() {
        let marker = if position == view.cursor_row { ">" } else { " " };
        let check = if selected { CHECK_ALL } else { CHECK_NONE };
        let mut cells = vec![format!("{marker}{check}")];
        cells.extend(row.values.iter().cloned());
        lines.push(cells.join(" | "));
    }
    lines.join("\n")
}

fn render_table_window(
    frame: &mut ratatui::Frame<'_>,
    state: &AppState,
    view_data: &ViewData,
    index: usize,
) {
    let view = &view_data.windows[index];
    let area = table_window_area(frame.area());
    frame.render_widget(Clear, area);
    let block = Block::default()
        .borders(Borders::ALL)
        .title(table_window_title(state, view_data, index))
        .border_style(focus_style(true));

    if matches!(view.table.data(), TableData::Pending) {
        let text = if view.table.load_failed() {
            LOAD_FAILED_TEXT
        } else {
            "loading..."
        };
        frame.render_widget(Paragraph::new(text).block(block), area);
        return;
    }

    let table = &view.table;
    let mut header_cells = vec![Cell::from(selection_mark(table.selection_summary()))];
    header_cells.extend((0..table.columns().len()).map(|column| {
        let style = if column == view.cursor_column {
            Style::default().add_modifier(Modifier::UNDERLINED | Modifier::BOLD)
        } else {
            Style::default().add_modifier(Modifier::BOLD)
        };
        Cell::from(header_label(table, column)).style(style)
    }));

    // Only rows inside the scroll window are materialized; overscan above
    // the viewport is not drawn.
    let first_on_screen = (table.scroll.offset / table.scroll.row_height.max(1)) as usize;
    let rows = table
        .visible_rows()
        .into_iter()
        .filter(|(position, _, _)| *position >= first_on_screen)
        .map(|(position, row, selected)| {
            let mut cells = vec![Cell::from(if selected { CHECK_ALL } else { CHECK_NONE })];
            cells.extend(row.values.iter().map(|value| Cell::from(value.clone())));
            let style = if position == view.cursor_row {
                Style::default().bg(Color::DarkGray)
            } else {
                Style::default()
            };
            Row::new(cells).style(style)
        })
        .collect::<Vec<_>>();

    let mut widths = vec![Constraint::Length(4)];
    widths.extend((0..table.columns().len()).map(|_| Constraint::Fill(1)));
    let widget = Table::new(rows, widths)
        .header(Row::new(header_cells))
        .block(block);
    frame.render_widget(widget, area);
}

fn status_text(state: &AppState, view_data: &ViewData) -> String {
    if view_data.help_visible {
        return String::new();
    }
    let hints = match view_data.focus {
        Focus::Map => "arrows pan | +/- zoom | h/j/k/l pointer | enter click",
        Focus::Layers => "j/k move | J/K reorder | space show | c color | enter menu | z/t/d",
        Focus::Table(_) => "j/k rows | h/l cols | s sort | space check | a all | enter zoom | x close",
    };
    let focus = match view_data.focus {
        Focus::Map => "MAP",
        Focus::Layers => "LAYERS",
        Focus::Table(_) => "TABLE",
    };
    let mut parts = vec![focus.to_owned()];
    if let Some(notice) = &state.notice {
        parts.push(notice.clone());
    }
    parts.push(hints.to_owned());
    if let Some(extent) = view_data.last_gesture {
        parts.push(format!(
            "view {:.2},{:.2}..{:.2},{:.2}",
            extent.west, extent.south, extent.east, extent.north
        ));
    }
    parts.push("tab focus | ? help | q quit".to_owned());
    parts.join(" | ")
}

fn help_overlay_text() -> &'static str {
    "global: tab/shift+tab focus | esc dismiss notice | ? help | q or ctrl+q quit\n\
map: arrows pan | +/- zoom | h/j/k/l move pointer | enter click | mouse drag/scroll/click\n\
layers: j/k move | J/K reorder | space/v show/hide | c color | enter/m menu\n\
layers: z zoom to layer | t attribute table | d delete layer\n\
table: j/k g/G pgup/pgdn rows | h/l column | s sort column | space check row\n\
table: a select all/none | enter zoom to feature | r reload | x/esc close"
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
