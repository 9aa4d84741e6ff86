//! The ATmega32U4's 1 KiB internal EEPROM as a [`ByteStore`].

use avr_device::atmega32u4::EEPROM;

use trikey_core::{BusError, ByteStore};

const EEPROM_SIZE: u16 = 1024;
/// A write cycle takes about 3.4 ms; this covers it with margin at 16 MHz.
const WRITE_POLL_CEILING: u16 = 0xFFFF;

const EERE: u8 = 0x01;
const EEPE: u8 = 0x02;
const EEMPE: u8 = 0x04;

pub struct InternalEeprom<'a> {
    eeprom: &'a EEPROM,
}

impl<'a> InternalEeprom<'a> {
    pub fn new(eeprom: &'a EEPROM) -> Self {
        Self { eeprom }
    }

    fn wait_ready(&self) -> Result<(), BusError> {
        let mut timeout = WRITE_POLL_CEILING;
        while self.eeprom.eecr.read().bits() & EEPE != 0 {
            timeout -= 1;
            if timeout == 0 {
                return Err(BusError::Timeout);
            }
        }
        Ok(())
    }
}

impl ByteStore for InternalEeprom<'_> {
    fn read_byte(&mut self, address: u16) -> Result<u8, BusError> {
        if address >= EEPROM_SIZE {
            return Err(BusError::OutOfBounds);
        }
        self.wait_ready()?;
        self.eeprom.eear.write(|w| unsafe { w.bits(address) });
        self.eeprom.eecr.write(|w| unsafe { w.bits(EERE) });
        Ok(self.eeprom.eedr.read().bits())
    }

    fn write_byte(&mut self, address: u16, value: u8) -> Result<(), BusError> {
        if address >= EEPROM_SIZE {
            return Err(BusError::OutOfBounds);
        }
        self.wait_ready()?;
        self.eeprom.eear.write(|w| unsafe { w.bits(address) });
        self.eeprom.eedr.write(|w| unsafe { w.bits(value) });
        // EEPE must follow EEMPE within four cycles.
        avr_device::interrupt::free(|_| {
            self.eeprom.eecr.write(|w| unsafe { w.bits(EEMPE) });
            self.eeprom.eecr.write(|w| unsafe { w.bits(EEMPE | EEPE) });
        });
        Ok(())
    }
}
