//! Relay event stream.
//!
//! Wraps a fragment stream as normalized events. The stream is pull-driven: the
//! upstream is only read when the consumer asks for the next event, so a slow
//! downstream holds back the upstream, and dropping the event stream drops the
//! upstream with it.

use crate::event::NormalizedEvent;
use futures::{Stream, StreamExt, stream};
use std::fmt::Display;
use tracing::{info, warn};

struct RelayState<S> {
    fragments: Option<S>,
    forwarded: usize,
}

/// Maps every fragment to a `Content` event and appends exactly one `Done`.
///
/// `Done` is emitted whether the fragment stream ends normally or with an
/// error; after an error no further upstream data is read. The upstream is
/// released as soon as it is exhausted.
pub fn relay_events<S, E>(fragments: S) -> impl Stream<Item = NormalizedEvent>
where
    S: Stream<Item = Result<String, E>> + Unpin,
    E: Display,
{
    let state = RelayState {
        fragments: Some(fragments),
        forwarded: 0,
    };

    stream::unfold(state, |mut st| async move {
        let fragments = st.fragments.as_mut()?;
        loop {
            match fragments.next().await {
                Some(Ok(fragment)) if fragment.is_empty() => continue,
                Some(Ok(fragment)) => {
                    st.forwarded += 1;
                    return Some((NormalizedEvent::Content(fragment), st));
                }
                Some(Err(e)) => {
                    warn!(error = %e, forwarded = st.forwarded, "Upstream failed mid-stream; closing turn early");
                    st.fragments = None;
                    return Some((NormalizedEvent::Done, st));
                }
                None => {
                    info!(forwarded = st.forwarded, "Upstream stream finished");
                    st.fragments = None;
                    return Some((NormalizedEvent::Done, st));
                }
            }
        }
    })
}
