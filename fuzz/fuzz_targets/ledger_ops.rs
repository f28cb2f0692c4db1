#![no_main]

use iico_core::invariants::check_clearing_invariants;
use iico_core::{BidId, Ledger, SaleParameters, Timestamp};
use libfuzzer_sys::fuzz_target;

const MAX_OPS: usize = 96;

struct Cursor<'a> {
    bytes: &'a [u8],
    index: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, index: 0 }
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.index.checked_add(n)?;
        if end > self.bytes.len() {
            return None;
        }
        let out = &self.bytes[self.index..end];
        self.index = end;
        Some(out)
    }

    fn take_u8(&mut self) -> Option<u8> {
        Some(*self.take(1)?.first()?)
    }

    fn take_u32_le(&mut self) -> Option<u32> {
        let s = self.take(4)?;
        let mut out = [0u8; 4];
        out.copy_from_slice(s);
        Some(u32::from_le_bytes(out))
    }
}

fuzz_target!(|data: &[u8]| {
    let mut c = Cursor::new(data);
    let params = match SaleParameters::new(
        Timestamp(0),
        Timestamp(1_000),
        Timestamp(2_000),
        Timestamp(3_000),
        0.2,
        1_000_000.0,
    ) {
        Ok(p) => p,
        Err(_) => return,
    };
    let mut ledger = Ledger::new(params);

    for _ in 0..MAX_OPS {
        let (kind, at) = match (c.take_u8(), c.take_u32_le()) {
            (Some(k), Some(t)) => (k % 4, Timestamp((t % 4_000) as i64)),
            _ => break,
        };
        let before = ledger.snapshot();
        let result = match kind {
            0 => {
                let (contrib, extra) = match (c.take_u32_le(), c.take_u32_le()) {
                    (Some(a), Some(b)) => (a as f64 / 100.0, (b % 1_000_000) as f64),
                    _ => break,
                };
                ledger
                    .submit_bid("fuzz", contrib, contrib + extra, at)
                    .map(|_| ())
            }
            1 => {
                let pick = match c.take_u8() {
                    Some(x) => x as u64,
                    None => break,
                };
                ledger.withdraw_bid(BidId(pick), at).map(|_| ())
            }
            2 => ledger.finalize_now(at).map(|_| ()),
            _ => {
                let pick = match c.take_u8() {
                    Some(x) => x as u64,
                    None => break,
                };
                ledger.redeem_bid(BidId(pick)).map(|_| ())
            }
        };

        // Rejection is acceptable; partial mutation is not.
        if result.is_err() {
            assert_eq!(ledger.snapshot(), before);
        }
        check_clearing_invariants(ledger.bids(), ledger.state()).expect("invariants hold");
    }
});
