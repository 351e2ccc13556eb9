//! Host event ingress
//!
//! The host delivers lifecycle and peer bus events as JSON lines, e.g.
//!
//! ```text
//! {"event":"start"}
//! {"event":"peer-joined","unit":"jenkins/0"}
//! {"event":"peer-changed","unit":"jenkins/0","data":{"url":"http://jenkins","secret":"..."}}
//! ```

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

use crate::controller::{UnitEvent, UnitHandle};
use crate::error::Result;

pub fn parse_event(line: &str) -> Result<UnitEvent> {
    Ok(serde_json::from_str(line)?)
}

/// Forward events from `reader` until EOF; malformed lines are skipped
pub async fn forward_events<R>(reader: R, handle: &UnitHandle) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut forwarded = 0;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_event(line) {
            Ok(event) => {
                debug!("Received {} event from host", event.kind());
                handle.send(event).await?;
                forwarded += 1;
            }
            Err(e) => warn!("Ignoring malformed host event: {}", e),
        }
    }

    Ok(forwarded)
}
