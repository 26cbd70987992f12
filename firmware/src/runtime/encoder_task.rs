use embassy_time::{Duration, Ticker};

use crate::hw::rotary::EncoderLines;

/// Fast enough to catch every Gray transition at realistic turn rates.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

#[embassy_executor::task]
pub async fn run(mut voltage: EncoderLines<'static>, mut current: EncoderLines<'static>) -> ! {
    let mut ticker = Ticker::every(POLL_INTERVAL);
    loop {
        ticker.next().await;
        voltage.poll();
        current.poll();
    }
}
