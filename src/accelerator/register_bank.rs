use std::ops::Index;

use super::bus::{Word, FULL_STROBE};

/// # Description
/// the register array of the slave, the only shared state of the accelerator
/// * every register is one bus word, all registers are zero after reset
/// * a write is visible to the very next read, there is no write buffer
#[derive(Debug, Clone)]
pub struct RegisterBank {
    regs: Vec<Word>,
}

/// # Description
/// a copy of the bank taken at the end of a tick
/// - this is what the FIR engine sees, always one tick old
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterSnapshot {
    regs: Vec<Word>,
}

impl RegisterBank {
    pub fn new(num_reg: usize) -> Self {
        RegisterBank {
            regs: vec![0; num_reg],
        }
    }

    pub fn len(&self) -> usize {
        self.regs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regs.is_empty()
    }

    /// `index` must be below `len()`
    pub fn read(&self, index: usize) -> Word {
        self.regs[index]
    }

    /// # Description
    /// write the bytes enabled in `strobe`, the other bytes keep the current value
    ///
    /// # Example
    /// ```
    /// use fir_accel::accelerator::register_bank::RegisterBank;
    /// let mut bank = RegisterBank::new(2);
    /// bank.write(1, 0x1122_3344_5566_7788, 0xff);
    /// bank.write(1, 0xaaaa_aaaa_aaaa_aaaa, 0b0000_0011);
    /// assert_eq!(bank.read(1), 0x1122_3344_5566_aaaa);
    /// ```
    pub fn write(&mut self, index: usize, word: Word, strobe: u8) {
        let old = self.regs[index];
        self.regs[index] = merge_strobe(old, word, strobe);
    }

    pub fn snapshot(&self) -> RegisterSnapshot {
        RegisterSnapshot {
            regs: self.regs.clone(),
        }
    }
}

impl RegisterSnapshot {
    pub fn read(&self, index: usize) -> Word {
        self.regs[index]
    }
    pub fn len(&self) -> usize {
        self.regs.len()
    }
    pub fn is_empty(&self) -> bool {
        self.regs.is_empty()
    }
}

impl Index<usize> for RegisterSnapshot {
    type Output = Word;
    fn index(&self, index: usize) -> &Self::Output {
        &self.regs[index]
    }
}

/// take byte `i` from `new` when bit `i` of `strobe` is set, from `old` otherwise
pub fn merge_strobe(old: Word, new: Word, strobe: u8) -> Word {
    if strobe == FULL_STROBE {
        return new;
    }
    let mask = (0..8)
        .filter(|i| strobe & (1 << i) != 0)
        .fold(0u64, |mask, i| mask | (0xff << (8 * i)));
    (new & mask) | (old & !mask)
}
