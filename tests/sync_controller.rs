//! Behaviour of the synchronization controller against a scripted widget.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use viewcluster::viewport::Handler;
use viewcluster::{
    Bounds, Cluster, ClusterAlgorithm, ClusterOptions, ClusterSync, LngLatBounds, MapWidget, PointFeature, PointRef,
    Result,
};

// =============================================================================
// Test helpers
// =============================================================================

/// A widget whose camera is set by the test, counting handler invocations.
#[derive(Default)]
struct Widget {
    bounds: Cell<Option<LngLatBounds>>,
    zoom: Cell<f64>,
    handlers: RefCell<Vec<Handler>>,
    invocations: Cell<usize>,
}

impl Widget {
    fn at(bounds: [f64; 4], zoom: f64) -> Rc<Widget> {
        let widget = Rc::new(Widget::default());
        widget.set(bounds, zoom);
        return widget;
    }

    fn set(&self, [w, s, e, n]: [f64; 4], zoom: f64) {
        self.bounds.set(Some(LngLatBounds::new([w, s], [e, n])));
        self.zoom.set(zoom);
    }

    fn move_to(&self, bounds: [f64; 4], zoom: f64) {
        self.set(bounds, zoom);
        self.fire();
    }

    fn fire(&self) {
        let handlers = self.handlers.borrow().clone();
        for handler in handlers {
            self.invocations.set(self.invocations.get() + 1);
            handler();
        }
    }
}

impl MapWidget for Widget {
    fn bounds(&self) -> Option<LngLatBounds> {
        return self.bounds.get();
    }

    fn zoom(&self) -> f64 {
        return self.zoom.get();
    }

    fn on(&self, _event: &str, handler: Handler) {
        self.handlers.borrow_mut().push(handler);
    }

    fn off(&self, _event: &str, handler: Option<&Handler>) {
        match handler {
            Some(h) => self.handlers.borrow_mut().retain(|x| !Rc::ptr_eq(x, h)),
            None => self.handlers.borrow_mut().clear(),
        }
    }
}

fn attach(widget: &Rc<Widget>) -> Option<Rc<dyn MapWidget>> {
    return Some(widget.clone());
}

const WORLD: [f64; 4] = [-180.0, -85.0, 180.0, 85.0];

fn points() -> Arc<[PointFeature<u32>]> {
    return Arc::from(vec![
        PointFeature::new(-30.0, 10.0, 0).with_id(1u64),
        PointFeature::new(20.0, 20.0, 1).with_id(2u64),
        PointFeature::new(20.001, 20.001, 2).with_id(3u64),
        PointFeature::new(20.002, 19.999, 3).with_id(4u64),
    ]);
}

/// An index whose answers are fresh allocations on every query: a single
/// point with id 1 at `[0, zoom / STEP]`.
struct Scripted<const STEP: i32> {
    queries: Cell<usize>,
}

impl<const STEP: i32> ClusterAlgorithm<(), ()> for Scripted<STEP> {
    fn build(_points: Arc<[PointFeature<()>]>, _options: &ClusterOptions<(), ()>) -> Result<Scripted<STEP>> {
        return Ok(Scripted { queries: Cell::new(0) });
    }

    fn get_clusters(&self, _bounds: &Bounds, zoom: i32) -> Vec<Cluster<(), ()>> {
        self.queries.set(self.queries.get() + 1);
        let lat = (zoom / STEP) as f64;
        return vec![Cluster::Point(PointRef::single(PointFeature::new(0.0, lat, ()).with_id(1u64)))];
    }

    fn get_children(&self, cluster_id: u64) -> Result<Vec<Cluster<(), ()>>> {
        return Err(viewcluster::Error::ClusterNotFound { cluster_id });
    }

    fn get_leaves(&self, cluster_id: u64, _limit: usize, _offset: usize) -> Result<Vec<PointRef<()>>> {
        return Err(viewcluster::Error::ClusterNotFound { cluster_id });
    }

    fn get_cluster_expansion_zoom(&self, cluster_id: u64) -> Result<u8> {
        return Err(viewcluster::Error::ClusterNotFound { cluster_id });
    }
}

// =============================================================================
// Idempotence and rebuilds
// =============================================================================

#[test]
fn unchanged_inputs_return_the_same_state() {
    let widget = Widget::at(WORLD, 2.0);
    let pts = points();
    let mut sync: ClusterSync<u32, ()> = ClusterSync::new(&pts, &ClusterOptions::default(), attach(&widget)).unwrap();

    let first = sync.update(&pts, &ClusterOptions::default(), attach(&widget)).unwrap();
    let second = sync.update(&pts, &ClusterOptions::default(), attach(&widget)).unwrap();
    assert!(first.same_state(&second));
    assert!(Rc::ptr_eq(first.state(), &sync.state()));
    assert_eq!(sync.build_count(), 1);
}

#[test]
fn equal_but_distinct_inputs_do_not_rebuild() {
    let widget = Widget::at(WORLD, 2.0);
    let mut sync: ClusterSync<u32, ()> =
        ClusterSync::new(&points(), &ClusterOptions::default().with_radius(60.0), attach(&widget)).unwrap();
    let before = sync.snapshot();

    let after = sync
        .update(&points(), &ClusterOptions::default().with_radius(60.0), attach(&widget))
        .unwrap();
    assert!(Arc::ptr_eq(before.supercluster(), after.supercluster()));
    assert!(before.same_state(&after));
}

#[test]
fn rebuild_on_points_or_options_change() {
    let widget = Widget::at(WORLD, 2.0);
    let pts = points();
    let mut sync: ClusterSync<u32, ()> = ClusterSync::new(&pts, &ClusterOptions::default(), attach(&widget)).unwrap();
    let first = sync.snapshot();

    let wider = sync.update(&pts, &ClusterOptions::default().with_radius(80.0), attach(&widget)).unwrap();
    assert!(!Arc::ptr_eq(first.supercluster(), wider.supercluster()));

    let mut more = pts.to_vec();
    more.push(PointFeature::new(100.0, -40.0, 4).with_id(5u64));
    let more: Arc<[PointFeature<u32>]> = Arc::from(more);
    let grown = sync.update(&more, &ClusterOptions::default().with_radius(80.0), attach(&widget)).unwrap();
    assert!(!Arc::ptr_eq(wider.supercluster(), grown.supercluster()));
    assert_eq!(grown.clusters().iter().map(|c| c.point_count()).sum::<usize>(), 5);
    assert_eq!(sync.build_count(), 3);
}

#[test]
fn widget_change_requeries_without_rebuilding() {
    let first = Widget::at(WORLD, 2.0);
    let second = Widget::at([19.0, 19.0, 21.0, 21.0], 17.0);
    let pts = points();
    let mut sync: ClusterSync<u32, ()> = ClusterSync::new(&pts, &ClusterOptions::default(), attach(&first)).unwrap();

    let snapshot = sync.update(&pts, &ClusterOptions::default(), attach(&second)).unwrap();
    assert_eq!(snapshot.clusters().len(), 3);
    assert_eq!(sync.build_count(), 1);
    assert!(first.handlers.borrow().is_empty());
    assert_eq!(second.handlers.borrow().len(), 1);
}

// =============================================================================
// Viewport sampling
// =============================================================================

fn unit_point() -> Arc<[PointFeature<()>]> {
    return Arc::from(vec![PointFeature::new(0.0, 0.0, ())]);
}

#[test]
fn zoom_is_rounded_half_up() {
    let widget = Widget::at(WORLD, 4.5);
    let sync: ClusterSync<(), (), Scripted<1>> =
        ClusterSync::new(&unit_point(), &ClusterOptions::default(), attach(&widget)).unwrap();
    assert_eq!(sync.state().viewport.unwrap().zoom, 5);

    widget.move_to(WORLD, 4.4);
    assert_eq!(sync.state().viewport.unwrap().zoom, 4);

    widget.move_to(WORLD, -0.5);
    assert_eq!(sync.state().viewport.unwrap().zoom, 0);
}

#[test]
fn bounds_are_flattened_west_south_east_north() {
    let widget = Widget::at([-10.0, -20.0, 30.0, 40.0], 3.0);
    let sync: ClusterSync<u32, ()> = ClusterSync::new(&points(), &ClusterOptions::default(), attach(&widget)).unwrap();
    assert_eq!(sync.state().viewport.unwrap().bounds, Bounds::new(-10.0, -20.0, 30.0, 40.0));
}

// =============================================================================
// Emission gating
// =============================================================================

#[test]
fn equal_cluster_lists_do_not_emit() {
    let widget = Widget::at(WORLD, 1.0);
    let sync: ClusterSync<(), (), Scripted<5>> =
        ClusterSync::new(&unit_point(), &ClusterOptions::default(), attach(&widget)).unwrap();
    let before = sync.state();
    assert_eq!(before.clusters[0].coordinates(), &[0.0, 0.0]);

    // A fresh but equal result: no new state.
    widget.move_to(WORLD, 2.0);
    assert_eq!(sync.index().queries.get(), 2);
    assert!(Rc::ptr_eq(&before, &sync.state()));
    assert_eq!(sync.emitted(), 0);

    // Coordinates move from [0, 0] to [0, 1]: new state.
    widget.move_to(WORLD, 5.0);
    assert_eq!(sync.emitted(), 1);
    assert_eq!(sync.state().clusters[0].coordinates(), &[0.0, 1.0]);
}

#[test]
fn unchanged_viewport_skips_the_query() {
    let widget = Widget::at(WORLD, 1.0);
    let sync: ClusterSync<(), (), Scripted<5>> =
        ClusterSync::new(&unit_point(), &ClusterOptions::default(), attach(&widget)).unwrap();
    assert_eq!(sync.index().queries.get(), 1);

    widget.fire();
    widget.move_to(WORLD, 1.2);
    assert_eq!(sync.index().queries.get(), 1);
}

// =============================================================================
// Detaching
// =============================================================================

#[test]
fn unattach_emits_once_and_silences_the_handler() {
    let widget = Widget::at(WORLD, 2.0);
    let pts = points();
    let mut sync: ClusterSync<u32, ()> = ClusterSync::new(&pts, &ClusterOptions::default(), attach(&widget)).unwrap();
    assert!(!sync.snapshot().clusters().is_empty());

    let delivered = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&delivered);
    let _observer = sync.observe(move |state| log.borrow_mut().push((state.viewport.is_none(), state.clusters.len())));

    let snapshot = sync.update(&pts, &ClusterOptions::default(), None).unwrap();
    assert!(snapshot.viewport().is_none());
    assert!(snapshot.clusters().is_empty());
    sync.update(&pts, &ClusterOptions::default(), None).unwrap();
    sync.detach();
    assert!(sync.flush());
    assert!(!sync.flush());
    assert_eq!(*delivered.borrow(), vec![(true, 0)]);
    assert_eq!(sync.emitted(), 1);

    widget.move_to([19.0, 19.0, 21.0, 21.0], 17.0);
    assert_eq!(widget.invocations.get(), 0);
    assert!(sync.snapshot().clusters().is_empty());
}

#[test]
fn in_flight_dispatch_after_teardown_is_ignored() {
    let widget = Widget::at(WORLD, 2.0);
    let pts = points();
    let mut sync: ClusterSync<u32, ()> = ClusterSync::new(&pts, &ClusterOptions::default(), attach(&widget)).unwrap();

    // Grab the handler list as a dispatcher would before teardown.
    let pending = widget.handlers.borrow().clone();
    sync.detach();
    let cleared = sync.state();

    widget.set([19.0, 19.0, 21.0, 21.0], 17.0);
    for handler in pending {
        handler();
    }
    assert!(Rc::ptr_eq(&cleared, &sync.state()));
}
