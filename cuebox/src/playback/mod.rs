//! Playback machinery behind the sound facade: single-use voices, the
//! multishot voice pool, and the gapless loop scheduler.

pub(crate) mod looper;
pub(crate) mod pool;
pub(crate) mod voice;
