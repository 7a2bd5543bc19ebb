/// Marches through an unbounded acquisition stream in steps of `interval` samples.
///
/// Unlike a looping output counter, acquisition positions never wrap: each tick returns the
/// batch sequence number and the half-open sample range `[start, end)` it covers.
pub struct ChunkCounter {
    seq: u64,
    pos: u64,
    interval: u64,
}

impl ChunkCounter {
    pub fn new(interval: usize) -> Self {
        Self {
            seq: 0,
            pos: 0,
            interval: interval as u64,
        }
    }

    pub fn pos(&self) -> u64 {
        self.pos
    }

    pub fn next_pos(&self) -> u64 {
        self.pos + self.interval
    }

    pub fn tick_next(&mut self) -> (u64, u64, u64) {
        let result = (self.seq, self.pos(), self.next_pos());
        self.pos = self.next_pos();
        self.seq += 1;
        result
    }
}
