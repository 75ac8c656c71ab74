use crate::model::Candle;

/// Sort candles by timestamp (oldest first) and drop duplicate timestamps.
///
/// When several candles share a timestamp, the one that appeared last in
/// `candles` wins.
pub fn sort_dedup(mut candles: Vec<Candle>) -> Vec<Candle> {
    // stable: equal timestamps keep input order, so the last of a run wins
    candles.sort_by_key(|c| c.timestamp);

    let mut series: Vec<Candle> = Vec::with_capacity(candles.len());
    for candle in candles {
        match series.last_mut() {
            Some(last) if last.timestamp == candle.timestamp => *last = candle,
            _ => series.push(candle),
        }
    }
    series
}

/// Keep only the newest `limit` candles of a canonical series.
pub fn keep_newest(mut series: Vec<Candle>, limit: usize) -> Vec<Candle> {
    if series.len() > limit {
        series.drain(..series.len() - limit);
    }
    series
}
