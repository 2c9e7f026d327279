//! An in-memory map widget for driving `viewcluster` without a renderer.
//!
//! [`HeadlessMap`] keeps a web-mercator camera (center, continuous zoom and a
//! viewport size in CSS pixels over 512-px tiles) and derives its visible
//! bounds from it, the way a browser map would. Every camera change fires
//! `"move"` to the registered handlers, synchronously by default.
//!
//! ```
//! use std::rc::Rc;
//! use headless_map::HeadlessMap;
//! use viewcluster::MapWidget;
//!
//! let map = Rc::new(HeadlessMap::new(1024.0, 512.0));
//! let bounds = map.bounds().unwrap().to_array();
//! assert_eq!(bounds[0][0], -360.0);
//! assert_eq!(bounds[1][0], 360.0);
//!
//! map.jump_to([10.0, 20.0], 8.0);
//! assert_eq!(map.zoom(), 8.0);
//! ```

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::trace;

use viewcluster::geo::{lat_y, lng_x, x_lng, y_lat, MAX_LATITUDE};
use viewcluster::viewport::Handler;
use viewcluster::{LngLatBounds, MapWidget, MOVE_EVENT};

/// Side of a map tile in CSS pixels.
pub const TILE_SIZE: f64 = 512.0;

/// Deepest zoom the camera accepts.
pub const MAX_ZOOM: f64 = 24.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    /// `[lng, lat]`
    pub center: [f64; 2],
    pub zoom: f64,
    pub width: f64,
    pub height: f64,
}

impl Camera {
    /// Size of the whole world in pixels at the current zoom.
    pub fn world_size(&self) -> f64 {
        return TILE_SIZE * self.zoom.exp2();
    }

    /// Visible bounds. Longitudes are not wrapped, so a viewport wider than
    /// the world reaches past ±180.
    pub fn bounds(&self) -> LngLatBounds {
        let size = self.world_size();
        let [lng, lat] = self.center;
        let cx = lng_x(lng) * size;
        let cy = lat_y(lat) * size;
        let (half_w, half_h) = (self.width / 2.0, self.height / 2.0);

        let west = x_lng((cx - half_w) / size);
        let east = x_lng((cx + half_w) / size);
        let north = y_lat((cy - half_h) / size);
        let south = y_lat((cy + half_h) / size);
        return LngLatBounds::new([west, south], [east, north]);
    }
}

/// A map widget with no renderer behind it.
pub struct HeadlessMap {
    camera: Cell<Camera>,
    ready: Cell<bool>,
    listeners: RefCell<FxHashMap<String, Vec<Handler>>>,
    queue_moves: Cell<bool>,
    queued: Cell<usize>,
    fired: Cell<u64>,
}

impl HeadlessMap {
    /// A map of `width` by `height` pixels centered on `[0, 0]` at zoom 0.
    pub fn new(width: f64, height: f64) -> HeadlessMap {
        return HeadlessMap {
            camera: Cell::new(Camera {
                center: [0.0, 0.0],
                zoom: 0.0,
                width,
                height,
            }),
            ready: Cell::new(true),
            listeners: RefCell::new(FxHashMap::default()),
            queue_moves: Cell::new(false),
            queued: Cell::new(0),
            fired: Cell::new(0),
        };
    }

    pub fn camera(&self) -> Camera {
        return self.camera.get();
    }

    pub fn center(&self) -> [f64; 2] {
        return self.camera.get().center;
    }

    /// Move the camera to `center` at `zoom`.
    pub fn jump_to(&self, center: [f64; 2], zoom: f64) {
        let mut camera = self.camera.get();
        camera.center = clamp_center(center);
        camera.zoom = zoom.clamp(0.0, MAX_ZOOM);
        self.set_camera(camera);
    }

    /// Shift the camera by a pixel offset; positive `dx` pans east and
    /// positive `dy` pans south.
    pub fn pan_by(&self, dx: f64, dy: f64) {
        let mut camera = self.camera.get();
        let size = camera.world_size();
        let [lng, lat] = camera.center;
        let x = lng_x(lng) + dx / size;
        let y = lat_y(lat) + dy / size;
        camera.center = clamp_center([x_lng(x), y_lat(y)]);
        self.set_camera(camera);
    }

    pub fn zoom_to(&self, zoom: f64) {
        let mut camera = self.camera.get();
        camera.zoom = zoom.clamp(0.0, MAX_ZOOM);
        self.set_camera(camera);
    }

    pub fn resize(&self, width: f64, height: f64) {
        let mut camera = self.camera.get();
        camera.width = width;
        camera.height = height;
        self.set_camera(camera);
    }

    /// While not ready the map reports no bounds, like a widget that has
    /// not been laid out yet. Becoming ready fires `"move"`.
    pub fn set_ready(&self, ready: bool) {
        let was = self.ready.replace(ready);
        if ready && !was {
            self.moved();
        }
    }

    /// Hold back `"move"` notifications until [`HeadlessMap::flush_events`].
    pub fn queue_moves(&self, queue: bool) {
        self.queue_moves.set(queue);
    }

    /// Deliver every held-back `"move"`. Each is dispatched against the
    /// camera as it is now, so handlers all see the final position.
    /// Returns how many were delivered.
    pub fn flush_events(&self) -> usize {
        let queued = self.queued.replace(0);
        for _ in 0..queued {
            self.dispatch(MOVE_EVENT);
        }
        return queued;
    }

    /// Number of notifications currently held back.
    pub fn queued(&self) -> usize {
        return self.queued.get();
    }

    /// Total number of dispatched events.
    pub fn fired(&self) -> u64 {
        return self.fired.get();
    }

    pub fn listener_count(&self, event: &str) -> usize {
        return self.listeners.borrow().get(event).map_or(0, Vec::len);
    }

    fn set_camera(&self, camera: Camera) {
        self.camera.set(camera);
        self.moved();
    }

    fn moved(&self) {
        if self.queue_moves.get() {
            self.queued.set(self.queued.get() + 1);
            return;
        }
        self.dispatch(MOVE_EVENT);
    }

    /// Call the handlers for `event`. Handlers registered or removed while
    /// dispatching take effect from the next event.
    fn dispatch(&self, event: &str) {
        let handlers = match self.listeners.borrow().get(event) {
            Some(handlers) => handlers.clone(),
            None => return,
        };
        self.fired.set(self.fired.get() + 1);
        trace!(event, handlers = handlers.len(), "dispatching map event");
        for handler in handlers {
            handler();
        }
    }
}

fn clamp_center([lng, lat]: [f64; 2]) -> [f64; 2] {
    let lng = ((lng + 180.0) % 360.0 + 360.0) % 360.0 - 180.0;
    return [lng, lat.clamp(-MAX_LATITUDE, MAX_LATITUDE)];
}

impl MapWidget for HeadlessMap {
    fn bounds(&self) -> Option<LngLatBounds> {
        if !self.ready.get() {
            return None;
        }
        return Some(self.camera.get().bounds());
    }

    fn zoom(&self) -> f64 {
        return self.camera.get().zoom;
    }

    fn on(&self, event: &str, handler: Handler) {
        self.listeners.borrow_mut().entry(event.to_string()).or_default().push(handler);
    }

    fn off(&self, event: &str, handler: Option<&Handler>) {
        let mut listeners = self.listeners.borrow_mut();
        match handler {
            Some(handler) => {
                if let Some(handlers) = listeners.get_mut(event) {
                    handlers.retain(|h| !Rc::ptr_eq(h, handler));
                    if handlers.is_empty() {
                        listeners.remove(event);
                    }
                }
            }
            None => {
                listeners.remove(event);
            }
        }
    }
}
