//! Closed-loop compression-level adaptation.
//!
//! The controller watches the codec's frame-progression snapshots and nudges
//! the compression level so that the producer (input), the compressing
//! workers, and the consumer (output flush) stay balanced. It uses coarse
//! queue-occupancy signals rather than wall-clock throughput, which keeps it
//! robust to bursty job completion.
//!
//! Two inputs feed the state machine:
//! - [`AdaptiveController::note_stream_call`] after every codec call, with
//!   whether the input position advanced and what the codec reported as
//!   immediately flushable *before* the call;
//! - [`AdaptiveController::observe`] on each display-refresh tick, with a
//!   fresh snapshot. When it returns a new level, the engine re-applies the
//!   level parameter; the codec picks it up at its next internal job
//!   boundary.

use crate::zstd::FrameProgression;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SpeedChange {
    NoChange,
    Slower,
    Faster,
}

/// Snapshot-driven level controller for one file.
pub struct AdaptiveController {
    prev_update: FrameProgression,
    prev_correction: FrameProgression,
    last_job_id: u32,
    flush_waiting: bool,
    input_presented: u32,
    input_blocked: u32,
    speed_change: SpeedChange,
    level: i32,
    min_level: i32,
    max_level: i32,
    nb_workers: u32,
}

impl AdaptiveController {
    /// `min_level`/`max_level` are the already-intersected clamps
    /// (preferences ∩ codec bounds).
    pub fn new(initial_level: i32, min_level: i32, max_level: i32, nb_workers: u32) -> Self {
        AdaptiveController {
            prev_update: FrameProgression::default(),
            prev_correction: FrameProgression::default(),
            last_job_id: 0,
            flush_waiting: false,
            input_presented: 0,
            input_blocked: 0,
            speed_change: SpeedChange::NoChange,
            level: initial_level,
            min_level,
            max_level,
            nb_workers,
        }
    }

    /// Current compression level.
    pub fn level(&self) -> i32 {
        self.level
    }

    /// Tallies one codec call.
    ///
    /// `input_advanced` is whether the call consumed any input;
    /// `to_flush_now` is the codec's flushable-byte count sampled before the
    /// call (0 means flushing had fully caught up with production).
    pub fn note_stream_call(&mut self, input_advanced: bool, to_flush_now: usize) {
        self.input_presented += 1;
        if !input_advanced {
            // Input buffer full and unconsumed: input runs faster than the
            // compression pipeline can drain it.
            self.input_blocked += 1;
        }
        if to_flush_now == 0 {
            self.flush_waiting = true;
        }
    }

    /// Processes one snapshot; returns the new level when it changed
    /// direction this tick (the engine re-sets the codec parameter).
    pub fn observe(&mut self, zfp: &FrameProgression) -> Option<i32> {
        // Output-speed checks need at least one completed worker job.
        if zfp.current_job_id > 1 {
            let newly_produced = zfp.produced - self.prev_update.produced;
            let newly_flushed = zfp.flushed - self.prev_update.flushed;

            // No data consumed and no worker active: every buffer is full,
            // the pipeline is stalled on the output side.
            if zfp.consumed == self.prev_update.consumed && zfp.nb_active_workers == 0 {
                self.speed_change = SpeedChange::Slower;
            }

            self.prev_update = *zfp;

            // Production outruns flushing while flushing was never starved:
            // the consumer is the bottleneck.
            if newly_produced > newly_flushed * 9 / 8 && !self.flush_waiting {
                self.speed_change = SpeedChange::Slower;
            }
            self.flush_waiting = false;
        }

        // Course-correct only when at least one new job completed.
        if zfp.current_job_id <= self.last_job_id {
            return None;
        }

        // Warm-up: wait until every worker has had a job.
        if zfp.current_job_id > self.nb_workers + 1 {
            if self.input_blocked == 0 {
                // Input never waited: the source is slower than ingestion.
                self.speed_change = SpeedChange::Slower;
            } else if self.speed_change == SpeedChange::NoChange {
                let newly_ingested = zfp.ingested - self.prev_correction.ingested;
                let newly_consumed = zfp.consumed - self.prev_correction.consumed;
                let newly_produced = zfp.produced - self.prev_correction.produced;
                let newly_flushed = zfp.flushed - self.prev_correction.flushed;
                self.prev_correction = *zfp;

                if self.input_blocked > self.input_presented / 8
                    && newly_flushed * 33 / 32 > newly_produced
                    && newly_ingested * 33 / 32 > newly_consumed
                {
                    // Input waits often while both compression and flushing
                    // keep up: spend the slack on a stronger level's inverse.
                    self.speed_change = SpeedChange::Faster;
                }
            }
            self.input_blocked = 0;
            self.input_presented = 0;
        }

        let result = match self.speed_change {
            SpeedChange::Slower => {
                self.level += 1;
                if self.level > self.max_level {
                    self.level = self.max_level;
                }
                if self.level == 0 {
                    self.level += 1; // level 0 is skipped in the direction of motion
                }
                Some(self.level)
            }
            SpeedChange::Faster => {
                self.level -= 1;
                if self.level < self.min_level {
                    self.level = self.min_level;
                }
                if self.level == 0 {
                    self.level -= 1;
                }
                Some(self.level)
            }
            SpeedChange::NoChange => None,
        };
        self.speed_change = SpeedChange::NoChange;
        self.last_job_id = zfp.current_job_id;
        result
    }
}

// ---------------------------------------------------------------------------
// Unit tests — synthetic snapshot traces
// ---------------------------------------------------------------------------
