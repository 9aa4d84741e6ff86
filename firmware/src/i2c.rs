//! TWI master and the 24LC512 bulk EEPROM driver.
//!
//! Two 64 KiB 24LC512 parts share the bus: A2..A0 strapped to 000 for the
//! first store and 001 for the second. Both use 16-bit word addresses sent
//! high byte first.

use avr_device::atmega32u4::TWI;

use trikey_core::{BusError, ByteStore};

/// 7-bit bus address of the first bulk store; the second is one above.
pub const BULK_A_ADDR: u8 = 0x50;
pub const BULK_B_ADDR: u8 = 0x51;

/// SCL = 16 MHz / (16 + 2 * 12) = 400 kHz.
const TWBR_VALUE: u8 = 12;

/// Spins on TWINT before a bus step counts as lost.
const TWINT_POLL_CEILING: u16 = 0xFFFF;
/// Address polls while the part finishes an internal write (max 5 ms).
const ACK_POLL_CEILING: u16 = 1000;

// TWI status codes
const TW_START: u8 = 0x08;
const TW_REP_START: u8 = 0x10;
const TW_MT_SLA_ACK: u8 = 0x18;
const TW_MT_DATA_ACK: u8 = 0x28;
const TW_MR_SLA_ACK: u8 = 0x40;
const TW_MR_DATA_NACK: u8 = 0x58;

/// Bring up the TWI peripheral. Call once before any [`Eeprom24`] access.
pub fn init(twi: &TWI) {
    twi.twbr.write(|w| unsafe { w.bits(TWBR_VALUE) });
    twi.twsr.write(|w| w.twps().prescaler_1());
    twi.twcr.write(|w| w.twen().set_bit());
}

/// One 24LC512 on the shared bus.
pub struct Eeprom24<'a> {
    twi: &'a TWI,
    device: u8,
}

impl<'a> Eeprom24<'a> {
    pub fn new(twi: &'a TWI, device: u8) -> Self {
        Self { twi, device }
    }

    fn select(&self, address: u16) -> Result<(), BusError> {
        self.start()?;
        self.write(self.device << 1, TW_MT_SLA_ACK)?;
        self.write((address >> 8) as u8, TW_MT_DATA_ACK)?;
        self.write(address as u8, TW_MT_DATA_ACK)
    }

    /// Poll until the part acknowledges its address again, which it only
    /// does once the internal write cycle is over.
    fn wait_write_cycle(&self) -> Result<(), BusError> {
        for _ in 0..ACK_POLL_CEILING {
            self.start()?;
            let acked = self.write(self.device << 1, TW_MT_SLA_ACK).is_ok();
            self.stop();
            if acked {
                return Ok(());
            }
        }
        Err(BusError::Timeout)
    }

    fn start(&self) -> Result<(), BusError> {
        self.twi
            .twcr
            .write(|w| w.twint().set_bit().twsta().set_bit().twen().set_bit());
        self.wait_twint()?;
        match self.status() {
            TW_START | TW_REP_START => Ok(()),
            _ => Err(self.abort(BusError::Nack)),
        }
    }

    fn write(&self, data: u8, expected: u8) -> Result<(), BusError> {
        self.twi.twdr.write(|w| unsafe { w.bits(data) });
        self.twi.twcr.write(|w| w.twint().set_bit().twen().set_bit());
        self.wait_twint()?;
        if self.status() != expected {
            return Err(self.abort(BusError::Nack));
        }
        Ok(())
    }

    fn read_nack(&self) -> Result<u8, BusError> {
        self.twi.twcr.write(|w| w.twint().set_bit().twen().set_bit());
        self.wait_twint()?;
        if self.status() != TW_MR_DATA_NACK {
            return Err(self.abort(BusError::Nack));
        }
        Ok(self.twi.twdr.read().bits())
    }

    fn stop(&self) {
        self.twi
            .twcr
            .write(|w| w.twint().set_bit().twsto().set_bit().twen().set_bit());
    }

    /// Release the bus after a failed step.
    fn abort(&self, err: BusError) -> BusError {
        self.stop();
        err
    }

    fn status(&self) -> u8 {
        self.twi.twsr.read().bits() & 0xF8
    }

    fn wait_twint(&self) -> Result<(), BusError> {
        let mut timeout = TWINT_POLL_CEILING;
        while self.twi.twcr.read().twint().bit_is_clear() {
            timeout -= 1;
            if timeout == 0 {
                return Err(self.abort(BusError::Timeout));
            }
        }
        Ok(())
    }
}

impl ByteStore for Eeprom24<'_> {
    fn read_byte(&mut self, address: u16) -> Result<u8, BusError> {
        self.select(address)?;
        self.start()?;
        self.write((self.device << 1) | 1, TW_MR_SLA_ACK)?;
        let value = self.read_nack()?;
        self.stop();
        Ok(value)
    }

    fn write_byte(&mut self, address: u16, value: u8) -> Result<(), BusError> {
        self.select(address)?;
        self.write(value, TW_MT_DATA_ACK)?;
        self.stop();
        self.wait_write_cycle()
    }
}
