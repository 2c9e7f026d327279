//! Reading the viewport of a host map widget, and scoped subscriptions to its
//! events.

use std::cell::Cell;
use std::rc::Rc;

use crate::equality::DeepEq;
use crate::geo::{Bounds, LngLatBounds};

/// The event a widget fires whenever its camera changes.
pub const MOVE_EVENT: &str = "move";

/// An event callback. Handlers are matched by allocation when unsubscribing.
pub type Handler = Rc<dyn Fn()>;

/// The capabilities needed from a host map widget.
pub trait MapWidget {
    /// Current visible bounds, or `None` while the widget cannot report them
    /// yet (for example before its first layout).
    fn bounds(&self) -> Option<LngLatBounds>;

    /// Current continuous zoom.
    fn zoom(&self) -> f64;

    /// Register `handler` for `event`.
    fn on(&self, event: &str, handler: Handler);

    /// Unregister `handler` from `event`, or every handler when `None`.
    fn off(&self, event: &str, handler: Option<&Handler>);
}

/// A snapshot of what the widget shows, at a discrete zoom.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewportState {
    pub bounds: Bounds,
    pub zoom: i32,
}

impl DeepEq for ViewportState {
    fn deep_eq(&self, other: &Self) -> bool {
        return self.zoom == other.zoom && self.bounds.deep_eq(&other.bounds);
    }
}

/// Sample the widget's current viewport.
///
/// Returns `None` when the widget cannot report bounds; callers treat that
/// the same as having no widget at all.
pub fn sample(widget: &dyn MapWidget) -> Option<ViewportState> {
    let bounds = widget.bounds()?.flatten();
    return Some(ViewportState {
        bounds,
        zoom: round_zoom(widget.zoom()),
    });
}

/// Round a continuous zoom to the nearest integer level, halves rounding up
/// (toward positive infinity): 4.5 becomes 5 and -0.5 becomes 0.
///
/// Non-finite input yields 0.
pub fn round_zoom(zoom: f64) -> i32 {
    if !zoom.is_finite() {
        return 0;
    }
    let floor = zoom.floor();
    let rounded = if zoom - floor >= 0.5 { floor + 1.0 } else { floor };
    return rounded as i32;
}

/// A live event subscription, released on drop.
///
/// The registered handler checks a liveness flag before running, so even a
/// dispatch already in flight when the subscription is dropped never reaches
/// the callback.
pub struct Subscription {
    widget: Rc<dyn MapWidget>,
    event: &'static str,
    handler: Handler,
    live: Rc<Cell<bool>>,
}

impl Subscription {
    /// Register `callback` for `event` on `widget`.
    pub fn new(widget: Rc<dyn MapWidget>, event: &'static str, callback: impl Fn() + 'static) -> Subscription {
        let live = Rc::new(Cell::new(true));
        let flag = Rc::clone(&live);
        let handler: Handler = Rc::new(move || {
            if flag.get() {
                callback();
            }
        });
        widget.on(event, Rc::clone(&handler));

        return Subscription {
            widget,
            event,
            handler,
            live,
        };
    }

    pub fn event(&self) -> &'static str {
        return self.event;
    }

    pub fn widget(&self) -> &Rc<dyn MapWidget> {
        return &self.widget;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.live.set(false);
        self.widget.off(self.event, Some(&self.handler));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct StubMap {
        bounds: Option<LngLatBounds>,
        zoom: f64,
        handlers: RefCell<Vec<Handler>>,
    }

    impl StubMap {
        fn fire(&self) {
            let handlers = self.handlers.borrow().clone();
            for handler in handlers {
                handler();
            }
        }
    }

    impl MapWidget for StubMap {
        fn bounds(&self) -> Option<LngLatBounds> {
            return self.bounds;
        }

        fn zoom(&self) -> f64 {
            return self.zoom;
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

    #[test]
    fn rounding_boundaries() {
        assert_eq!(round_zoom(4.5), 5);
        assert_eq!(round_zoom(4.4), 4);
        assert_eq!(round_zoom(4.49999), 4);
        assert_eq!(round_zoom(-0.5), 0);
        assert_eq!(round_zoom(-0.6), -1);
        assert_eq!(round_zoom(-1.5), -1);
        assert_eq!(round_zoom(0.49999999999999994), 0);
        assert_eq!(round_zoom(f64::NAN), 0);
    }

    #[test]
    fn sample_flattens_bounds() {
        let map = StubMap {
            bounds: Some(LngLatBounds::new([-20.0, -10.0], [20.0, 10.0])),
            zoom: 3.6,
            ..StubMap::default()
        };
        let state = sample(&map).unwrap();
        assert_eq!(state.bounds, Bounds::new(-20.0, -10.0, 20.0, 10.0));
        assert_eq!(state.zoom, 4);
    }

    #[test]
    fn sample_without_bounds_is_none() {
        let map = StubMap::default();
        assert!(sample(&map).is_none());
    }

    #[test]
    fn subscription_unregisters_on_drop() {
        let map = Rc::new(StubMap::default());
        let calls = Rc::new(Cell::new(0));

        let counter = Rc::clone(&calls);
        let subscription = Subscription::new(map.clone(), MOVE_EVENT, move || counter.set(counter.get() + 1));
        assert_eq!(subscription.event(), MOVE_EVENT);
        map.fire();
        assert_eq!(calls.get(), 1);

        drop(subscription);
        assert!(map.handlers.borrow().is_empty());
        map.fire();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn in_flight_dispatch_skips_dropped_subscription() {
        let map = Rc::new(StubMap::default());
        let calls = Rc::new(Cell::new(0));

        let counter = Rc::clone(&calls);
        let subscription = Subscription::new(map.clone(), MOVE_EVENT, move || counter.set(counter.get() + 1));
        let snapshot = map.handlers.borrow().clone();
        drop(subscription);

        for handler in snapshot {
            handler();
        }
        assert_eq!(calls.get(), 0);
    }
}
