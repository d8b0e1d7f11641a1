//! Typed in-process service registry.
//!
//! Components publish capabilities (deployers, configuration stores,
//! stability checkers, pending-work reporters) by registering them in a
//! [`ServiceRegistry`], and react to other components coming and going by
//! subscribing a [`ServiceListener`].
//!
//! Guarantees:
//! - services are listed in registration order;
//! - a listener sees every service exactly once on arrival, including the
//!   services already registered when it subscribed;
//! - listeners are invoked outside the registry's internal lock, so a
//!   listener may call back into the registry.
//!
//! Registries created from the same [`ServiceCensus`] share one live-service
//! counter, which the service-churn stability checker samples.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Identifier of one registration, unique per registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceId(pub u64);

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "service-{}", self.0)
    }
}

/// Identifier of one subscription, unique per registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Arrival/departure callbacks for one service type.
pub trait ServiceListener<T: ?Sized>: Send + Sync {
    fn on_arrival(&self, id: ServiceId, service: &Arc<T>);

    fn on_departure(&self, id: ServiceId, service: &Arc<T>);
}

/// Shared counter of live registrations across several registries.
#[derive(Debug, Clone, Default)]
pub struct ServiceCensus {
    live: Arc<AtomicUsize>,
}

impl ServiceCensus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of services currently registered in every registry sharing
    /// this census.
    pub fn count(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    fn arrived(&self) {
        self.live.fetch_add(1, Ordering::SeqCst);
    }

    fn departed(&self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

struct Entries<T: ?Sized> {
    services: Vec<(ServiceId, Arc<T>)>,
    listeners: Vec<(ListenerId, Arc<dyn ServiceListener<T>>)>,
}

struct Inner<T: ?Sized> {
    entries: Mutex<Entries<T>>,
    next_id: AtomicU64,
    census: ServiceCensus,
}

/// Registry of live services of type `T`. Cloning yields another handle on
/// the same registry.
pub struct ServiceRegistry<T: ?Sized> {
    inner: Arc<Inner<T>>,
}

impl<T: ?Sized> Clone for ServiceRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: ?Sized> Default for ServiceRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for ServiceRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.len())
            .finish()
    }
}

impl<T: ?Sized> ServiceRegistry<T> {
    pub fn new() -> Self {
        Self::with_census(ServiceCensus::new())
    }

    pub fn with_census(census: ServiceCensus) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(Entries {
                    services: Vec::new(),
                    listeners: Vec::new(),
                }),
                next_id: AtomicU64::new(1),
                census,
            }),
        }
    }

    /// Publish a service and notify every listener of its arrival.
    pub fn register(&self, service: Arc<T>) -> ServiceId {
        let id = ServiceId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        let listeners = {
            let mut entries = self.inner.entries.lock();
            entries.services.push((id, Arc::clone(&service)));
            entries
                .listeners
                .iter()
                .map(|(_, listener)| Arc::clone(listener))
                .collect::<Vec<_>>()
        };
        self.inner.census.arrived();
        tracing::debug!(service = %id, "service registered");
        for listener in listeners {
            listener.on_arrival(id, &service);
        }
        id
    }

    /// Withdraw a service and notify every listener of its departure.
    ///
    /// Returns `None` if the service was not (or no longer) registered.
    pub fn unregister(&self, id: ServiceId) -> Option<Arc<T>> {
        let (service, listeners) = {
            let mut entries = self.inner.entries.lock();
            let position = entries
                .services
                .iter()
                .position(|(service_id, _)| *service_id == id)?;
            let (_, service) = entries.services.remove(position);
            let listeners = entries
                .listeners
                .iter()
                .map(|(_, listener)| Arc::clone(listener))
                .collect::<Vec<_>>();
            (service, listeners)
        };
        self.inner.census.departed();
        tracing::debug!(service = %id, "service unregistered");
        for listener in listeners {
            listener.on_departure(id, &service);
        }
        Some(service)
    }

    /// Subscribe to arrivals and departures. The listener is immediately told
    /// about every service already registered.
    pub fn subscribe(&self, listener: Arc<dyn ServiceListener<T>>) -> ListenerId {
        let id = ListenerId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        let current = {
            let mut entries = self.inner.entries.lock();
            entries.listeners.push((id, Arc::clone(&listener)));
            entries.services.clone()
        };
        for (service_id, service) in &current {
            listener.on_arrival(*service_id, service);
        }
        id
    }

    /// Remove a subscription. Departures are not replayed.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut entries = self.inner.entries.lock();
        let before = entries.listeners.len();
        entries.listeners.retain(|(listener_id, _)| *listener_id != id);
        entries.listeners.len() != before
    }

    /// Live services in registration order.
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.inner
            .entries
            .lock()
            .services
            .iter()
            .map(|(_, service)| Arc::clone(service))
            .collect()
    }

    /// Live services with their identifiers, in registration order.
    pub fn entries(&self) -> Vec<(ServiceId, Arc<T>)> {
        self.inner.entries.lock().services.clone()
    }

    /// The earliest registered live service, if any.
    pub fn first(&self) -> Option<Arc<T>> {
        self.inner
            .entries
            .lock()
            .services
            .first()
            .map(|(_, service)| Arc::clone(service))
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn census(&self) -> &ServiceCensus {
        &self.inner.census
    }
}
