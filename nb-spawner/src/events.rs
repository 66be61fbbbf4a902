//! Per-user append-only event streams.  The broker is transport-agnostic:
//! it hands back a plain `Stream` of events, and the HTTP layer dresses
//! that up as server-sent events.

use futures::Stream;
use futures::stream;
use nb_api::v1::Event;

use crate::user_map::{
    EventPoll,
    UserMap,
};

#[derive(Clone)]
pub struct EventBroker {
    map: UserMap,
}

impl EventBroker {
    pub fn new(map: UserMap) -> EventBroker {
        EventBroker { map }
    }

    pub fn append(&self, username: &str, event: Event) {
        self.map.append_event(username, event);
    }

    /// A lazy, single-consumer stream over the user's event queue, in
    /// append order.  It blocks while the queue is drained and ends
    /// cleanly after a terminal event or once the record is destroyed.
    pub fn publish(&self, username: &str) -> impl Stream<Item = Event> + Send + 'static {
        let map = self.map.clone();
        let username = username.to_string();

        stream::unfold(Some(0u64), move |state| {
            let map = map.clone();
            let username = username.clone();
            async move {
                let cursor = state?;
                loop {
                    let notify = map.notifier(&username)?;
                    let notified = notify.notified();
                    tokio::pin!(notified);
                    // Register for wakeups before checking the queue, so an
                    // append between the check and the await isn't lost
                    notified.as_mut().enable();

                    match map.poll_event(&username, cursor) {
                        EventPoll::Ready(event, next) => {
                            let next_state = if event.is_terminal() { None } else { Some(next) };
                            return Some((event, next_state));
                        },
                        EventPoll::Pending => notified.await,
                        EventPoll::Closed => return None,
                    }
                }
            }
        })
    }
}
