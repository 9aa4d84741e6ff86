//! Error taxonomy shared by every layer of the core.
//!
//! Failures travel up as values: storage driver -> [`StorageController`] ->
//! layer -> [`LayerController`] -> runtime, which turns them into the error
//! LED. Nothing here panics or retries.
//!
//! [`StorageController`]: crate::storage::StorageController
//! [`LayerController`]: crate::layers::LayerController

use core::fmt;

/// A byte-level bus transfer did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// The device did not acknowledge its address or a data byte.
    Nack,
    /// A busy-wait hit its iteration ceiling.
    Timeout,
    /// The address lies outside the device.
    OutOfBounds,
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusError::Nack => f.write_str("device did not acknowledge"),
            BusError::Timeout => f.write_str("bus operation timed out"),
            BusError::OutOfBounds => f.write_str("address out of bounds"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    Bus(BusError),
    /// Shortcut id outside the category's slot range.
    OutOfRange,
    /// The shortcut already holds its maximum number of entries.
    Full,
}

impl From<BusError> for StorageError {
    fn from(err: BusError) -> Self {
        StorageError::Bus(err)
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Bus(err) => write!(f, "eeprom: {}", err),
            StorageError::OutOfRange => f.write_str("shortcut id out of range"),
            StorageError::Full => f.write_str("shortcut is full"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsbError {
    /// The PLL never reported lock within the bring-up ceiling.
    PllTimeout,
    /// The host has not selected a configuration yet.
    NotConfigured,
    /// The keyboard endpoint stayed busy for the whole frame budget.
    EndpointTimeout,
}

impl fmt::Display for UsbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UsbError::PllTimeout => f.write_str("usb pll did not lock"),
            UsbError::NotConfigured => f.write_str("usb device not configured"),
            UsbError::EndpointTimeout => f.write_str("keyboard endpoint not ready"),
        }
    }
}

/// Any failure a layer operation can surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    Storage(StorageError),
    Usb(UsbError),
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        Error::Storage(err)
    }
}

impl From<BusError> for Error {
    fn from(err: BusError) -> Self {
        Error::Storage(StorageError::Bus(err))
    }
}

impl From<UsbError> for Error {
    fn from(err: UsbError) -> Self {
        Error::Usb(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Storage(err) => err.fmt(f),
            Error::Usb(err) => err.fmt(f),
        }
    }
}

impl core::error::Error for BusError {}
impl core::error::Error for StorageError {}
impl core::error::Error for UsbError {}
impl core::error::Error for Error {}
