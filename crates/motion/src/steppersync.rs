//! Merges the compressed command streams from every stepper's
//! [`StepCompressor`] into a single clock-ordered transmission batch, the
//! way a multi-stepper printer's host must interleave commands addressed
//! to different MCU stepper objects but destined for one serial link.
//!
//! Each MCU stepper object also has a small queue of move "slots" it can
//! have in flight at once; `min_clock` on a [`QueuedMessage`] marks which
//! slot a command claims and when that slot frees up again. A binary
//! min-heap over per-slot availability (`move_clocks`) tracks the
//! earliest time any slot is free, mirroring the array-based heap the C
//! original keeps instead of a separate heap data structure.

use crate::error::Result;
use crate::stepcompress::{QueuedMessage, StepCompressor};

/// Tracks per-move-slot availability across one MCU's queue and merges
/// multiple steppers' compressed commands into transmission order.
pub struct StepperSync {
    move_clocks: Vec<u64>,
}

impl StepperSync {
    pub fn new(move_num: usize) -> StepperSync {
        StepperSync { move_clocks: vec![0; move_num.max(1)] }
    }

    /// Replace the heap's minimum with `req_clock` and sift down.
    fn heap_replace(&mut self, req_clock: u64) {
        let mc = &mut self.move_clocks;
        let n = mc.len();
        let mut pos = 0usize;
        loop {
            let child1 = 2 * pos + 1;
            let child2 = 2 * pos + 2;
            let c1 = if child1 < n { mc[child1] } else { u64::MAX };
            let c2 = if child2 < n { mc[child2] } else { u64::MAX };
            if req_clock <= c1 && req_clock <= c2 {
                mc[pos] = req_clock;
                return;
            }
            if c1 < c2 {
                mc[pos] = c1;
                pos = child1;
            } else {
                mc[pos] = c2;
                pos = child2;
            }
        }
    }

    pub fn set_time(&self, steppers: &mut [StepCompressor], time_offset: f64, mcu_freq: f64) {
        for sc in steppers.iter_mut() {
            sc.set_time(time_offset, mcu_freq);
        }
    }

    /// Flush every stepper up to `move_clock`, then drain their queued
    /// messages in ascending `req_clock` order, stopping once the lowest
    /// remaining message both claims a move slot (`min_clock != 0`) and
    /// sits beyond `move_clock` — those wait for the next flush.
    pub fn flush(&mut self, steppers: &mut [StepCompressor], move_clock: u64) -> Result<Vec<QueuedMessage>> {
        for sc in steppers.iter_mut() {
            sc.flush(move_clock)?;
        }

        let mut batch = Vec::new();
        loop {
            let mut best: Option<(usize, u64)> = None;
            for (i, sc) in steppers.iter().enumerate() {
                if let Some(qm) = sc.peek_message() {
                    if best.map_or(true, |(_, rc)| qm.req_clock < rc) {
                        best = Some((i, qm.req_clock));
                    }
                }
            }
            let (i, req_clock) = match best {
                Some(v) => v,
                None => break,
            };
            let min_clock = steppers[i].peek_message().unwrap().min_clock;
            if min_clock != 0 && req_clock > move_clock {
                break;
            }

            let next_avail = self.move_clocks[0];
            if min_clock != 0 {
                self.heap_replace(min_clock);
            }

            let mut qm = steppers[i].pop_message().unwrap();
            qm.min_clock = next_avail;
            batch.push(qm);
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stepcompress::StepMessage;

    #[test]
    fn messages_from_two_steppers_merge_in_clock_order() {
        let mut a = StepCompressor::new(0, 2, false);
        let mut b = StepCompressor::new(1, 2, false);
        a.set_time(0.0, 1_000_000.0);
        b.set_time(0.0, 1_000_000.0);

        for i in 1..=5u64 {
            a.append(true, 0.0, i as f64 * 0.002).unwrap();
        }
        for i in 1..=5u64 {
            b.append(true, 0.0, i as f64 * 0.001).unwrap();
        }

        let mut sync = StepperSync::new(1);
        let mut steppers = vec![a, b];
        let batch = sync.flush(&mut steppers, u64::MAX).unwrap();

        assert!(!batch.is_empty());
        let mut last_clock = 0u64;
        for qm in &batch {
            assert!(qm.req_clock >= last_clock);
            last_clock = qm.req_clock;
        }
        assert!(batch.iter().any(|qm| matches!(qm.msg, StepMessage::QueueSteps { .. } | StepMessage::QueueStep { .. })));
    }
}
