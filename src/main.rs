use image::RgbaImage;
use minifb::{Key, KeyRepeat, MouseButton, MouseMode, Window, WindowOptions};
use std::cmp::max;
use std::cmp::min;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::{Duration, Instant};
use streetgrid::{
    snapshot, Algorithm, BoundingBox, EntityStore, GridIndex, LatLong, MercatorProjection,
    PathEvent, PathFinder, PathRequest, PointId, RenderOutcome, RouteAssembler, RouteOutcome,
    SceneLedger, Settings, TagDictionary, Tile, TileCache, TilePlanner, TileRenderer,
    TravelModes, Viewport, ViewportTracker, WayId, MAX_ZOOM_LEVEL,
};
use tracing::{debug, error, info, warn};

const WINDOW_WIDTH: usize = 800;
const WINDOW_HEIGHT: usize = 600;
const MIN_ZOOM_LEVEL: u8 = 10;
const BACKGROUND: u32 = 0x00F0F0F0;
const DEFAULT_WAY_COLOR: u32 = 0x00808080;
const POINT_COLOR: u32 = 0x00FF6060;
const ROUTE_COLOR: u32 = 0x00E02020;
const VIA_COLOR: u32 = 0x002060E0;
/// Search window, in degrees, when snapping a click to the road network.
const SNAP_RADIUS: f64 = 0.005;

struct PathSession {
    finder: PathFinder,
    events: Receiver<PathEvent>,
    ready: bool,
    route: RouteAssembler,
}

struct MapViewer {
    window: Window,
    buffer: Vec<u32>,
    window_size: (usize, usize),
    store: Arc<EntityStore>,
    dictionary: TagDictionary,
    tracker: ViewportTracker,
    ledger: SceneLedger,
    points: HashSet<PointId>,
    center_lat: f64,
    center_lon: f64,
    zoom: u8,
    dirty: bool,
    view_changed: bool,
    planner: TilePlanner,
    renderer: Option<(TileRenderer, Receiver<RenderOutcome>)>,
    in_flight: HashSet<Tile>,
    /// Decoded background tiles of the current plan.
    tiles: HashMap<Tile, RgbaImage>,
    path: Option<PathSession>,
    algorithm: Algorithm,
    modes: TravelModes,
    via_points: Vec<LatLong>,
    route: Vec<LatLong>,
    mouse_was_down: bool,
    last_frame_time: Instant,
    frame_count: usize,
}

impl MapViewer {
    fn new(settings: &Settings) -> Result<Self, String> {
        let mut window = Window::new(
            "streetgrid",
            WINDOW_WIDTH,
            WINDOW_HEIGHT,
            WindowOptions {
                resize: true,
                ..WindowOptions::default()
            },
        )
        .map_err(|e| e.to_string())?;

        // Limit to max ~60 fps
        window.limit_update_rate(Some(Duration::from_micros(16600)));

        let store = snapshot::load_or_ingest(&settings.snapshot_path, &settings.map_path)
            .map_err(|e| format!("Failed to load map data: {}", e))?;
        let store = Arc::new(store);
        let grid = GridIndex::build(&store, settings.cell_size).map_err(|e| e.to_string())?;

        let dictionary = match &settings.tag_colors_path {
            Some(path) => TagDictionary::load(path).map_err(|e| e.to_string())?,
            None => TagDictionary::default(),
        };

        let start = settings
            .start_position
            .or_else(|| store.bounds().map(|bounds| bounds.get_center_point()))
            .unwrap_or(LatLong::new(0.0, 0.0));

        let planner = TilePlanner::new(TileCache::new(
            settings.tile_cache_root.clone(),
            settings.tile_cache_capacity,
        ));
        let renderer = settings
            .renderer_program
            .clone()
            .map(|program| TileRenderer::spawn(program, settings.tile_cache_root.clone()));

        let path = match &settings.pathfinder_program {
            Some(program) => match PathFinder::spawn(program.clone()) {
                Ok((finder, events)) => Some(PathSession {
                    finder,
                    events,
                    ready: false,
                    route: RouteAssembler::new(),
                }),
                Err(e) => {
                    error!("{}", e);
                    None
                }
            },
            None => None,
        };

        Ok(MapViewer {
            window,
            buffer: vec![0; WINDOW_WIDTH * WINDOW_HEIGHT],
            window_size: (WINDOW_WIDTH, WINDOW_HEIGHT),
            store,
            dictionary,
            tracker: ViewportTracker::new(Arc::new(grid)),
            ledger: SceneLedger::new(),
            points: HashSet::new(),
            center_lat: start.latitude,
            center_lon: start.longitude,
            zoom: settings.start_zoom.clamp(MIN_ZOOM_LEVEL, MAX_ZOOM_LEVEL),
            dirty: true,
            view_changed: true,
            planner,
            renderer,
            in_flight: HashSet::new(),
            tiles: HashMap::new(),
            path,
            algorithm: Algorithm::Dijkstra,
            modes: TravelModes::ALL,
            via_points: Vec::new(),
            route: Vec::new(),
            mouse_was_down: false,
            last_frame_time: Instant::now(),
            frame_count: 0,
        })
    }

    fn to_screen(&self, lat: f64, lon: f64, width: usize, height: usize) -> (i32, i32) {
        let cx = MercatorProjection::longitude_to_pixel_x(self.center_lon, self.zoom);
        let cy = MercatorProjection::latitude_to_pixel_y(self.center_lat, self.zoom);
        let px = MercatorProjection::longitude_to_pixel_x(lon, self.zoom);
        let py = MercatorProjection::latitude_to_pixel_y(lat, self.zoom);
        (
            width as i32 / 2 + (px - cx) as i32,
            height as i32 / 2 + (py - cy) as i32,
        )
    }

    fn from_screen(&self, x: f64, y: f64, width: usize, height: usize) -> LatLong {
        let cx = MercatorProjection::longitude_to_pixel_x(self.center_lon, self.zoom);
        let cy = MercatorProjection::latitude_to_pixel_y(self.center_lat, self.zoom);
        LatLong::new(
            MercatorProjection::pixel_y_to_latitude(cy + y - height as f64 / 2.0, self.zoom),
            MercatorProjection::pixel_x_to_longitude(cx + x - width as f64 / 2.0, self.zoom),
        )
    }

    fn visible_bounds(&self) -> BoundingBox {
        let (width, height) = self.window.get_size();
        BoundingBox::from_corners(
            self.from_screen(0.0, 0.0, width, height),
            self.from_screen(width as f64, height as f64, width, height),
        )
    }

    fn handle_input(&mut self) {
        // Pan by a fixed share of the screen regardless of zoom
        let pan_factor = 360.0 / (1u64 << self.zoom) as f64 * 0.05;
        let before = (self.center_lat, self.center_lon, self.zoom);

        if self.window.is_key_down(Key::Left) {
            self.center_lon -= pan_factor;
        }
        if self.window.is_key_down(Key::Right) {
            self.center_lon += pan_factor;
        }
        if self.window.is_key_down(Key::Up) {
            self.center_lat += pan_factor;
        }
        if self.window.is_key_down(Key::Down) {
            self.center_lat -= pan_factor;
        }
        self.center_lat = self.center_lat.clamp(-80.0, 80.0);
        self.center_lon = self.center_lon.clamp(-180.0, 180.0);

        if self.window.is_key_pressed(Key::Equal, KeyRepeat::No) && self.zoom < 19 {
            self.zoom += 1;
            info!("Zooming in to level {}", self.zoom);
        }
        if self.window.is_key_pressed(Key::Minus, KeyRepeat::No) && self.zoom > MIN_ZOOM_LEVEL {
            self.zoom -= 1;
            info!("Zooming out to level {}", self.zoom);
        }

        if self.window.is_key_pressed(Key::Tab, KeyRepeat::No) {
            let position = Algorithm::ALL
                .iter()
                .position(|algorithm| *algorithm == self.algorithm)
                .unwrap_or(0);
            self.algorithm = Algorithm::ALL[(position + 1) % Algorithm::ALL.len()];
            info!("Algorithm: {}", self.algorithm);
        }
        if self.window.is_key_pressed(Key::Backspace, KeyRepeat::No) {
            self.via_points.clear();
            self.route.clear();
            self.dirty = true;
        }
        if self.window.is_key_pressed(Key::Enter, KeyRepeat::No) {
            self.request_route();
        }

        let mouse_down = self.window.get_mouse_down(MouseButton::Left);
        if mouse_down && !self.mouse_was_down {
            if let Some((x, y)) = self.window.get_mouse_pos(MouseMode::Discard) {
                self.add_via_point(x as f64, y as f64);
            }
        }
        self.mouse_was_down = mouse_down;

        if before != (self.center_lat, self.center_lon, self.zoom) {
            self.view_changed = true;
        }

        let size = self.window.get_size();
        if size != self.window_size {
            debug!("Window resized to {}x{}", size.0, size.1);
            self.window_size = size;
            self.view_changed = true;
        }
    }

    fn add_via_point(&mut self, x: f64, y: f64) {
        let (width, height) = self.window.get_size();
        let clicked = self.from_screen(x, y, width, height);
        match self
            .store
            .nearest_routable(clicked, SNAP_RADIUS, self.modes, &self.dictionary)
        {
            Some(point) => {
                debug!("Snapped click to node {}", point.id);
                self.via_points.push(point.position);
                self.dirty = true;
            }
            None => warn!(
                "No routable node near {:.5}, {:.5}",
                clicked.latitude, clicked.longitude
            ),
        }
    }

    fn request_route(&mut self) {
        if self.via_points.len() < 2 {
            warn!("A route needs at least a start and an end point");
            return;
        }
        let Some(session) = self.path.as_mut() else {
            warn!("No path finder configured");
            return;
        };
        if !session.ready {
            warn!("Path finder is still loading its graph");
            return;
        }
        let request = PathRequest {
            algorithm: self.algorithm,
            modes: self.modes,
            points: self.via_points.clone(),
        };
        session.route.begin(&self.via_points);
        if let Err(e) = session.finder.send(&request) {
            error!("{}", e);
            self.path = None;
        }
    }

    fn poll_path_events(&mut self) {
        let Some(session) = self.path.as_mut() else {
            return;
        };
        let mut failed = false;
        while let Ok(event) = session.events.try_recv() {
            match event {
                PathEvent::Ready => {
                    info!("Path finder ready");
                    session.ready = true;
                }
                PathEvent::Progress(percent) => debug!("Path finder progress {}%", percent),
                PathEvent::TimeMillis(millis) => info!("Route computed in {}ms", millis),
                PathEvent::Failed(message) => {
                    error!("Path finder failed: {}", message);
                    failed = true;
                    break;
                }
                PathEvent::Other(line) => debug!("path finder: {}", line),
                event => {
                    let store = &self.store;
                    let outcome = session
                        .route
                        .accept(&event, |id| store.point(id).map(|point| point.position));
                    match outcome {
                        Some(RouteOutcome::Found(route)) => {
                            info!("Route with {} vertices", route.len());
                            self.route = route;
                            self.dirty = true;
                        }
                        Some(RouteOutcome::NotFound) => {
                            warn!("No path between the selected points");
                            self.route.clear();
                            self.dirty = true;
                        }
                        None => {}
                    }
                }
            }
        }
        if failed {
            self.path = None;
        }
    }

    fn update_scene(&mut self) {
        if !self.view_changed {
            return;
        }
        self.view_changed = false;
        self.dirty = true;

        let visible = self.visible_bounds();
        let bounds = match self.store.bounds() {
            Some(data) => visible.intersection(&data),
            None => BoundingBox::empty(),
        };
        let delta = self.tracker.update(Viewport::new(bounds, self.zoom));
        let change = self.ledger.apply(&delta, self.tracker.grid());
        for id in change.erase_points {
            self.points.remove(&id);
        }
        self.points.extend(change.draw_points);

        self.plan_tiles(&visible);
    }

    fn plan_tiles(&mut self, visible: &BoundingBox) {
        let plan = match self.planner.plan(visible, self.zoom) {
            Ok(plan) => plan,
            Err(e) => {
                warn!("Skipping tile planning: {}", e);
                return;
            }
        };

        let wanted: HashSet<Tile> = plan
            .cached
            .iter()
            .map(|(tile, _)| *tile)
            .chain(plan.needs_render.iter().copied())
            .collect();
        self.tiles.retain(|tile, _| wanted.contains(tile));
        for (tile, path) in &plan.cached {
            if !self.tiles.contains_key(tile) {
                self.load_tile(*tile, path);
            }
        }

        if let Some((renderer, _)) = &self.renderer {
            for tile in plan.needs_render {
                if self.in_flight.insert(tile) {
                    if let Err(e) = renderer.request(tile) {
                        error!("{}", e);
                        self.in_flight.remove(&tile);
                    }
                }
            }
        }
    }

    fn poll_render_outcomes(&mut self) {
        let Some((_, outcomes)) = &self.renderer else {
            return;
        };
        let visible = self.visible_bounds();
        let mut ready = Vec::new();
        while let Ok(outcome) = outcomes.try_recv() {
            self.in_flight.remove(&outcome.tile);
            if let Ok(path) = outcome.result {
                self.planner.cache_mut().mark_rendered(outcome.tile);
                if TilePlanner::is_still_wanted(&outcome.tile, &visible, self.zoom) {
                    ready.push((outcome.tile, path));
                } else {
                    debug!("Dropping stale tile {}", outcome.tile);
                }
            }
        }
        for (tile, path) in ready {
            self.load_tile(tile, &path);
        }
    }

    fn load_tile(&mut self, tile: Tile, path: &Path) {
        match image::open(path) {
            Ok(image) => {
                debug!("Tile {} ready at {}", tile, path.display());
                self.tiles.insert(tile, image.to_rgba8());
                self.dirty = true;
            }
            Err(e) => warn!("Cannot decode tile {}: {}", path.display(), e),
        }
    }

    fn draw_tile(origin: (i32, i32), image: &RgbaImage, buffer: &mut [u32], width: usize) {
        for (x, y, pixel) in image.enumerate_pixels() {
            let [r, g, b, a] = pixel.0;
            if a == 0 {
                continue;
            }
            let color = ((r as u32) << 16) | ((g as u32) << 8) | b as u32;
            set_pixel(origin.0 + x as i32, origin.1 + y as i32, color, buffer, width);
        }
    }

    fn fill_polygon(
        points: &[(i32, i32)],
        color: u32,
        buffer: &mut [u32],
        width: usize,
        height: usize,
    ) {
        if points.len() < 3 {
            return;
        }

        let mut min_y = i32::MAX;
        let mut max_y = i32::MIN;
        for &(_, y) in points {
            min_y = min(min_y, y);
            max_y = max(max_y, y);
        }
        min_y = max(0, min_y);
        max_y = min(height as i32 - 1, max_y);

        for y in min_y..=max_y {
            let mut nodes = Vec::new();
            for i in 0..points.len() {
                let j = (i + 1) % points.len();
                let (x1, y1) = points[i];
                let (x2, y2) = points[j];
                if (y1 <= y && y2 > y) || (y2 <= y && y1 > y) {
                    let x = x1 + ((y - y1) as f64 * (x2 - x1) as f64 / (y2 - y1) as f64) as i32;
                    nodes.push(x);
                }
            }
            nodes.sort();

            for pair in nodes.chunks_exact(2) {
                let start_x = max(0, pair[0]);
                let end_x = min(width as i32 - 1, pair[1]);
                for x in start_x..=end_x {
                    buffer[(y as usize) * width + (x as usize)] = color;
                }
            }
        }
    }

    fn draw_thick_line(
        (x0, y0): (i32, i32),
        (x1, y1): (i32, i32),
        color: u32,
        line_width: u8,
        buffer: &mut [u32],
        width: usize,
    ) {
        // Bresenham, stamping a square for thickness
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        let (mut x, mut y) = (x0, y0);
        let thickness = line_width as i32 / 2;
        let height = (buffer.len() / width) as i32;
        let span = width as i32;

        // Segments far off screen are not worth walking
        if (x0 < -span && x1 < -span) || (y0 < -height && y1 < -height) {
            return;
        }
        if (x0 > 2 * span && x1 > 2 * span) || (y0 > 2 * height && y1 > 2 * height) {
            return;
        }

        loop {
            for oy in -thickness..=thickness {
                for ox in -thickness..=thickness {
                    set_pixel(x + ox, y + oy, color, buffer, width);
                }
            }
            if x == x1 && y == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    fn draw_marker(x: i32, y: i32, radius: i32, color: u32, buffer: &mut [u32], width: usize) {
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                let distance_squared = dx * dx + dy * dy;
                if distance_squared <= radius * radius {
                    set_pixel(x + dx, y + dy, color, buffer, width);
                } else if distance_squared <= (radius + 1) * (radius + 1) {
                    set_pixel(x + dx, y + dy, 0x00000000, buffer, width);
                }
            }
        }
    }

    fn render(&mut self) -> Result<(), String> {
        let (width, height) = self.window.get_size();
        if width == 0 || height == 0 {
            // Minimised
            self.window.update();
            return Ok(());
        }
        if width * height != self.buffer.len() {
            self.buffer = vec![0; width * height];
            self.dirty = true;
        }
        if !self.dirty {
            return self
                .window
                .update_with_buffer(&self.buffer, width, height)
                .map_err(|e| e.to_string());
        }
        self.dirty = false;
        let start_time = Instant::now();

        for pixel in self.buffer.iter_mut() {
            *pixel = BACKGROUND;
        }

        for (tile, image) in &self.tiles {
            let north_west =
                MercatorProjection::unproject(tile.tile_x, tile.tile_y, tile.zoom_level);
            let origin =
                self.to_screen(north_west.latitude, north_west.longitude, width, height);
            Self::draw_tile(origin, image, &mut self.buffer, width);
        }

        let mut ways: Vec<WayId> = self.ledger.displayed_ways().collect();
        ways.sort_unstable();

        // Areas first so lines stay visible on top
        let mut lines = Vec::new();
        for way_id in ways {
            let Some(way) = self.store.way(way_id) else {
                continue;
            };
            let color = self
                .dictionary
                .color_for(&way.tags)
                .map(|rgb| rgb.to_u32())
                .unwrap_or(DEFAULT_WAY_COLOR);
            let screen: Vec<(i32, i32)> = self
                .store
                .way_geometry(way)
                .iter()
                .map(|p| self.to_screen(p.latitude, p.longitude, width, height))
                .collect();
            if way.is_closed() && self.dictionary.is_enclosed(&way.tags) {
                Self::fill_polygon(&screen, color, &mut self.buffer, width, height);
                let outline = darken_color(color, 0.8);
                for pair in screen.windows(2) {
                    Self::draw_thick_line(pair[0], pair[1], outline, 1, &mut self.buffer, width);
                }
            } else {
                let line_width = if way.is_road() { 3 } else { 1 };
                lines.push((screen, color, line_width));
            }
        }
        for (screen, color, line_width) in lines {
            for pair in screen.windows(2) {
                Self::draw_thick_line(pair[0], pair[1], color, line_width, &mut self.buffer, width);
            }
        }

        for &point_id in &self.points {
            let Some(point) = self.store.point(point_id) else {
                continue;
            };
            if point.tags.is_empty() {
                continue;
            }
            let (x, y) =
                self.to_screen(point.position.latitude, point.position.longitude, width, height);
            let color = self
                .dictionary
                .color_for(&point.tags)
                .map(|rgb| rgb.to_u32())
                .unwrap_or(POINT_COLOR);
            Self::draw_marker(x, y, 2, color, &mut self.buffer, width);
        }

        let route: Vec<(i32, i32)> = self
            .route
            .iter()
            .map(|p| self.to_screen(p.latitude, p.longitude, width, height))
            .collect();
        for pair in route.windows(2) {
            Self::draw_thick_line(pair[0], pair[1], ROUTE_COLOR, 4, &mut self.buffer, width);
        }
        for via in &self.via_points {
            let (x, y) = self.to_screen(via.latitude, via.longitude, width, height);
            Self::draw_marker(x, y, 5, VIA_COLOR, &mut self.buffer, width);
        }

        self.frame_count += 1;
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_frame_time);
        if elapsed.as_millis() > 1000 {
            debug!(
                "{} redraws in {:?}, {} ways and {} points displayed",
                self.frame_count,
                elapsed,
                self.ledger.displayed_way_count(),
                self.points.len()
            );
            self.last_frame_time = now;
            self.frame_count = 0;
        }
        let frame_time = start_time.elapsed();
        if frame_time.as_millis() > 100 {
            debug!("Frame render time: {:?}", frame_time);
        }

        self.window.set_title(&format!(
            "streetgrid - zoom {} - {} - {} via points",
            self.zoom,
            self.algorithm,
            self.via_points.len()
        ));
        self.window
            .update_with_buffer(&self.buffer, width, height)
            .map_err(|e| e.to_string())
    }
}

fn set_pixel(x: i32, y: i32, color: u32, buffer: &mut [u32], width: usize) {
    if x >= 0 && x < width as i32 && y >= 0 && y < (buffer.len() / width) as i32 {
        buffer[(y as usize) * width + (x as usize)] = color;
    }
}

fn darken_color(color: u32, factor: f64) -> u32 {
    let r = ((color >> 16) & 0xFF) as f64 * factor;
    let g = ((color >> 8) & 0xFF) as f64 * factor;
    let b = (color & 0xFF) as f64 * factor;

    ((r as u32) << 16) | ((g as u32) << 8) | (b as u32)
}

fn main() -> Result<(), String> {
    let settings = match std::env::args().nth(1) {
        Some(path) => Settings::load(PathBuf::from(path)).map_err(|e| e.to_string())?,
        None => Settings::default(),
    };

    let level = settings
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();

    let mut viewer = MapViewer::new(&settings)?;

    while viewer.window.is_open() && !viewer.window.is_key_down(Key::Escape) {
        viewer.handle_input();
        viewer.poll_path_events();
        viewer.update_scene();
        viewer.poll_render_outcomes();

        if let Err(e) = viewer.render() {
            error!("Rendering error: {}", e);
            break;
        }
    }

    Ok(())
}
