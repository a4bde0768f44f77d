//! Choose which source supplies the next replayed record.
use crate::record::PayloadType;
use crate::source::Source;

/// Index of the source whose look-ahead should be emitted next, or `None`
/// when every source is exhausted.
///
/// A buffered response wins immediately, regardless of timestamps, so the
/// downstream matcher is never kept waiting for it. Otherwise the oldest
/// look-ahead wins; on equal timestamps the first source in enumeration
/// order keeps the slot.
pub fn select_next(sources: &[Source]) -> Option<usize> {
    let mut best: Option<(usize, i64)> = None;
    for (idx, source) in sources.iter().enumerate() {
        let (Some(kind), Some(ts)) = (source.peek_type(), source.peek_timestamp()) else {
            continue;
        };
        if kind == PayloadType::Response {
            return Some(idx);
        }
        match best {
            Some((_, best_ts)) if best_ts <= ts => {}
            _ => best = Some((idx, ts)),
        }
    }
    best.map(|(idx, _)| idx)
}
