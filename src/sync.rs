//! Keeps the visible clusters of an index in step with a map widget.
//!
//! A [`ClusterSync`] owns three things: the index manager, the current
//! [`SyncState`] and, while a widget is attached, a [`Subscription`] to the
//! widget's move event. States are immutable and shared as `Rc`, so a state
//! only counts as "emitted" when the `Rc` is replaced.
//!
//! ```text
//!            update(points, options, widget)
//!                        │
//!            index or widget identity changed?
//!               │ no                  │ yes
//!            (keep)          drop old subscription
//!                                     │
//!                      widget? ── no ─┴─▶ emit {index, None, []}
//!                        │ yes
//!                 update pass, subscribe "move" ──▶ update pass per event
//! ```
//!
//! Each update pass samples the widget and then:
//! 1. index differs from the current state's: re-query and emit;
//! 2. viewport differs: re-query, emit only if the clusters differ
//!    (see [`clusters_shallow_equal`]);
//! 3. otherwise nothing.
//!
//! Observers registered with [`ClusterSync::observe`] are called from
//! [`ClusterSync::flush`], at most once per distinct state, so a burst of
//! move events between two flushes is delivered as its final state only.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::equality::{clusters_shallow_equal, deep_equal};
use crate::error::Result;
use crate::feature::{Cluster, PointFeature};
use crate::index::{ClusterAlgorithm, IndexManager};
use crate::options::ClusterOptions;
use crate::supercluster::Supercluster;
use crate::viewport::{self, MapWidget, Subscription, ViewportState, MOVE_EVENT};

/// The clusters of an index as seen through a viewport.
///
/// `viewport` is `None` exactly when no widget is attached (or the widget
/// cannot report bounds yet), and then `clusters` is empty.
pub struct SyncState<P, C, A = Supercluster<P, C>> {
    pub index: Arc<A>,
    pub viewport: Option<ViewportState>,
    pub clusters: Vec<Cluster<P, C>>,
}

impl<P, C, A> SyncState<P, C, A> {
    fn unattached(index: Arc<A>) -> SyncState<P, C, A> {
        return SyncState {
            index,
            viewport: None,
            clusters: Vec::new(),
        };
    }

    fn is_unattached_with(&self, index: &Arc<A>) -> bool {
        return Arc::ptr_eq(&self.index, index) && self.viewport.is_none() && self.clusters.is_empty();
    }
}

/// What a caller renders: the visible clusters and the index they came from.
pub struct Snapshot<P, C, A = Supercluster<P, C>> {
    state: Rc<SyncState<P, C, A>>,
}

impl<P, C, A> Clone for Snapshot<P, C, A> {
    fn clone(&self) -> Self {
        return Snapshot {
            state: Rc::clone(&self.state),
        };
    }
}

impl<P, C, A> Snapshot<P, C, A> {
    pub fn clusters(&self) -> &[Cluster<P, C>] {
        return &self.state.clusters;
    }

    /// The index, for expansion queries on the returned clusters.
    pub fn supercluster(&self) -> &Arc<A> {
        return &self.state.index;
    }

    pub fn viewport(&self) -> Option<&ViewportState> {
        return self.state.viewport.as_ref();
    }

    pub fn state(&self) -> &Rc<SyncState<P, C, A>> {
        return &self.state;
    }

    /// Whether both snapshots come from the same emitted state.
    pub fn same_state(&self, other: &Self) -> bool {
        return Rc::ptr_eq(&self.state, &other.state);
    }
}

type ObserverFn<P, C, A> = Rc<dyn Fn(&Rc<SyncState<P, C, A>>)>;

/// State shared between the controller and its event handler.
struct Shared<P, C, A> {
    state: RefCell<Rc<SyncState<P, C, A>>>,
    /// Last state handed to observers.
    delivered: RefCell<Rc<SyncState<P, C, A>>>,
    /// Keyed by registration order.
    observers: RefCell<BTreeMap<u64, ObserverFn<P, C, A>>>,
    next_observer: Cell<u64>,
    emitted: Cell<u64>,
    deliveries: Cell<u64>,
}

impl<P, C, A> Shared<P, C, A> {
    fn new(state: Rc<SyncState<P, C, A>>) -> Shared<P, C, A> {
        return Shared {
            delivered: RefCell::new(Rc::clone(&state)),
            state: RefCell::new(state),
            observers: RefCell::new(BTreeMap::new()),
            next_observer: Cell::new(0),
            emitted: Cell::new(0),
            deliveries: Cell::new(0),
        };
    }

    fn current(&self) -> Rc<SyncState<P, C, A>> {
        return Rc::clone(&self.state.borrow());
    }

    fn emit(&self, state: SyncState<P, C, A>) {
        *self.state.borrow_mut() = Rc::new(state);
        self.emitted.set(self.emitted.get() + 1);
    }
}

/// One update pass against `widget` for the given index.
fn update_pass<P, C, A>(shared: &Shared<P, C, A>, index: &Arc<A>, widget: &dyn MapWidget)
where
    A: ClusterAlgorithm<P, C>,
{
    let current = shared.current();

    let Some(next) = viewport::sample(widget) else {
        if !current.is_unattached_with(index) {
            trace!("widget has no bounds, clearing clusters");
            shared.emit(SyncState::unattached(Arc::clone(index)));
        }
        return;
    };

    if !Arc::ptr_eq(&current.index, index) {
        let clusters = index.get_clusters(&next.bounds, next.zoom);
        trace!(zoom = next.zoom, clusters = clusters.len(), "index changed, clusters re-queried");
        shared.emit(SyncState {
            index: Arc::clone(index),
            viewport: Some(next),
            clusters,
        });
        return;
    }

    if !deep_equal(&current.viewport, &Some(next)) {
        let clusters = index.get_clusters(&next.bounds, next.zoom);
        if clusters_shallow_equal(&current.clusters, &clusters) {
            trace!(zoom = next.zoom, "viewport moved, clusters unchanged");
            return;
        }
        trace!(zoom = next.zoom, clusters = clusters.len(), "viewport moved, clusters changed");
        shared.emit(SyncState {
            index: Arc::clone(index),
            viewport: Some(next),
            clusters,
        });
    }
}

/// Keeps the clusters of an index synchronized with a map widget's viewport.
///
/// ```
/// use std::sync::Arc;
/// use viewcluster::{ClusterOptions, ClusterSync, PointFeature};
///
/// let points: Arc<[PointFeature<u32>]> = Arc::from(vec![
///     PointFeature::new(10.0, 10.0, 1),
///     PointFeature::new(10.001, 10.001, 2),
/// ]);
/// let options = ClusterOptions::<u32, u32>::default();
///
/// // No widget yet: nothing is visible.
/// let mut sync: ClusterSync<u32, u32> = ClusterSync::new(&points, &options, None).unwrap();
/// assert!(sync.snapshot().clusters().is_empty());
///
/// // Same inputs again: the index is reused.
/// let before = sync.snapshot();
/// let after = sync.update(&points, &options, None).unwrap();
/// assert!(Arc::ptr_eq(before.supercluster(), after.supercluster()));
/// ```
pub struct ClusterSync<P, C, A = Supercluster<P, C>> {
    manager: IndexManager<P, C, A>,
    shared: Rc<Shared<P, C, A>>,
    /// Index and widget of the current activation.
    index: Arc<A>,
    widget: Option<Rc<dyn MapWidget>>,
    subscription: Option<Subscription>,
}

impl<P, C, A> ClusterSync<P, C, A>
where
    P: PartialEq + 'static,
    C: 'static,
    A: ClusterAlgorithm<P, C> + 'static,
{
    /// Build the index and, when a widget is given, query it right away and
    /// start following the widget's move events.
    pub fn new(
        points: &Arc<[PointFeature<P>]>,
        options: &ClusterOptions<P, C>,
        widget: Option<Rc<dyn MapWidget>>,
    ) -> Result<ClusterSync<P, C, A>> {
        let mut manager: IndexManager<P, C, A> = IndexManager::new();
        let index = manager.resolve(points, options)?;

        let viewport = widget.as_deref().and_then(viewport::sample);
        let clusters = match &viewport {
            Some(v) => index.get_clusters(&v.bounds, v.zoom),
            None => Vec::new(),
        };
        let state = Rc::new(SyncState {
            index: Arc::clone(&index),
            viewport,
            clusters,
        });

        let mut sync = ClusterSync {
            manager,
            shared: Rc::new(Shared::new(state)),
            index: Arc::clone(&index),
            widget: None,
            subscription: None,
        };
        sync.activate(index, widget);
        return Ok(sync);
    }

    /// Bring the controller in line with the latest inputs and return what
    /// to render.
    ///
    /// Rebuilds the index only when points or options changed, and
    /// re-subscribes only when the index or the widget changed. An index
    /// build failure is returned as is; the previous state stays in place.
    pub fn update(
        &mut self,
        points: &Arc<[PointFeature<P>]>,
        options: &ClusterOptions<P, C>,
        widget: Option<Rc<dyn MapWidget>>,
    ) -> Result<Snapshot<P, C, A>> {
        let index = self.manager.resolve(points, options)?;

        let same_index = Arc::ptr_eq(&index, &self.index);
        let same_widget = match (&widget, &self.widget) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        if !same_index || !same_widget {
            self.activate(index, widget);
        }

        return Ok(self.snapshot());
    }

    /// Stop following the widget and clear the visible clusters.
    pub fn detach(&mut self) {
        if self.widget.is_some() {
            let index = Arc::clone(&self.index);
            self.activate(index, None);
        }
    }

    /// Run an update pass now, as if the widget had fired a move event.
    pub fn refresh(&self) {
        if let Some(widget) = &self.widget {
            update_pass(&self.shared, &self.index, widget.as_ref());
        }
    }

    /// Tear down the previous activation and set up a new one.
    fn activate(&mut self, index: Arc<A>, widget: Option<Rc<dyn MapWidget>>) {
        self.subscription = None;

        match &widget {
            None => {
                if !self.shared.current().is_unattached_with(&index) {
                    self.shared.emit(SyncState::unattached(Arc::clone(&index)));
                }
                if self.widget.is_some() {
                    debug!("map widget detached");
                }
            }
            Some(widget) => {
                update_pass(&self.shared, &index, widget.as_ref());

                let shared = Rc::downgrade(&self.shared);
                let target: Weak<dyn MapWidget> = Rc::downgrade(widget);
                let handler_index = Arc::clone(&index);
                self.subscription = Some(Subscription::new(Rc::clone(widget), MOVE_EVENT, move || {
                    let (Some(shared), Some(widget)) = (shared.upgrade(), target.upgrade()) else {
                        return;
                    };
                    update_pass(&shared, &handler_index, widget.as_ref());
                }));
                debug!("map widget attached");
            }
        }

        self.index = index;
        self.widget = widget;
    }
}

impl<P, C, A> ClusterSync<P, C, A> {
    /// The current clusters and index.
    pub fn snapshot(&self) -> Snapshot<P, C, A> {
        return Snapshot {
            state: self.shared.current(),
        };
    }

    /// The current state.
    pub fn state(&self) -> Rc<SyncState<P, C, A>> {
        return self.shared.current();
    }

    pub fn index(&self) -> &Arc<A> {
        return &self.index;
    }

    pub fn is_attached(&self) -> bool {
        return self.widget.is_some();
    }

    /// Number of states emitted since construction.
    pub fn emitted(&self) -> u64 {
        return self.shared.emitted.get();
    }

    /// Number of indices built since construction.
    pub fn build_count(&self) -> u64 {
        return self.manager.build_count();
    }

    /// Call `f` with each new state delivered by [`ClusterSync::flush`].
    /// The observer stays registered until the returned guard is dropped.
    pub fn observe(&self, f: impl Fn(&Rc<SyncState<P, C, A>>) + 'static) -> Observer
    where
        P: 'static,
        C: 'static,
        A: 'static,
    {
        let id = self.shared.next_observer.get();
        self.shared.next_observer.set(id + 1);
        self.shared.observers.borrow_mut().insert(id, Rc::new(f));

        let shared = Rc::downgrade(&self.shared);
        return Observer {
            remove: Some(Box::new(move || {
                if let Some(shared) = shared.upgrade() {
                    shared.observers.borrow_mut().remove(&id);
                }
            })),
        };
    }

    /// Deliver the current state to observers if it has not been delivered
    /// yet. Returns whether anything was delivered.
    pub fn flush(&self) -> bool {
        let current = self.shared.current();
        if Rc::ptr_eq(&self.shared.delivered.borrow(), &current) {
            return false;
        }
        *self.shared.delivered.borrow_mut() = Rc::clone(&current);
        self.shared.deliveries.set(self.shared.deliveries.get() + 1);

        let observers: Vec<ObserverFn<P, C, A>> = self.shared.observers.borrow().values().cloned().collect();
        for observer in observers {
            observer(&current);
        }
        return true;
    }

    /// Number of states delivered to observers.
    pub fn deliveries(&self) -> u64 {
        return self.shared.deliveries.get();
    }
}

/// Registration of a state observer, removed on drop.
pub struct Observer {
    remove: Option<Box<dyn FnOnce()>>,
}

impl Drop for Observer {
    fn drop(&mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}
