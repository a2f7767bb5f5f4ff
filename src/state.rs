//! Save state infrastructure.
//!
//! Each emulated subsystem (CPU, bus, PPU, APU, timer) implements
//! [`StateComponent`], serializing its live register/counter state (not
//! cartridge ROM/RAM contents, whose persistence is a host concern) as a
//! flat little-endian byte cursor using the
//! [`pebblecore_common::data`] read/write helpers. [`StateManager`]
//! orchestrates a full-machine snapshot by writing/reading each
//! subsystem's bytes behind a small tagged header, always in the same
//! fixed order, so that a save produced by one build can be read back
//! section-by-section even if a later subsystem's section is missing,
//! truncated, or from a slightly different layout.

use std::io::Cursor;

use pebblecore_common::{
    data::{read_bytes, read_u32, write_bytes, write_u32},
    error::Error,
};

/// Selects the encoding a [`StateComponent`] should use. Components that
/// only have one encoding may ignore this; it exists so future formats
/// can be introduced without changing every component's signature.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum StateFormat {
    #[default]
    Default,
}

/// A subsystem capable of serializing and restoring its own live state.
pub trait StateComponent {
    fn state(&self, format: Option<StateFormat>) -> Result<Vec<u8>, Error>;
    fn set_state(&mut self, data: &[u8], format: Option<StateFormat>) -> Result<(), Error>;
}

/// Fixed tag identifying a subsystem's section within a save state
/// buffer. The numeric value is part of the on-disk layout.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StateTag {
    Cpu = 0x01,
    Bus = 0x02,
    Ppu = 0x03,
    Apu = 0x04,
    Timer = 0x05,
}

/// Order in which [`StateManager`] writes and reads subsystem sections.
/// Fixed so that a reader never needs to guess which section comes next.
pub const STATE_TAG_ORDER: [StateTag; 5] = [
    StateTag::Cpu,
    StateTag::Bus,
    StateTag::Ppu,
    StateTag::Apu,
    StateTag::Timer,
];

/// Writes a single tagged section: a one-byte tag, a little-endian u32
/// length, then the raw bytes.
pub fn write_to_save(buffer: &mut Cursor<Vec<u8>>, tag: StateTag, data: &[u8]) -> Result<(), Error> {
    write_u32(buffer, tag as u32)?;
    write_u32(buffer, data.len() as u32)?;
    write_bytes(buffer, data)?;
    Ok(())
}

/// Reads back a single tagged section, returning `(tag, data)`. Callers
/// are expected to tolerate a truncated/absent section by treating end
/// of buffer as "no more sections" rather than as an error.
pub fn read_from_save(buffer: &mut Cursor<&[u8]>) -> Result<(StateTag, Vec<u8>), Error> {
    let raw_tag = read_u32(buffer)?;
    let tag = match raw_tag {
        0x01 => StateTag::Cpu,
        0x02 => StateTag::Bus,
        0x03 => StateTag::Ppu,
        0x04 => StateTag::Apu,
        0x05 => StateTag::Timer,
        _ => return Err(Error::SaveFormat),
    };
    let len = read_u32(buffer)? as usize;
    let data = read_bytes(buffer, len)?;
    Ok((tag, data))
}

/// Serializes/restores a whole machine snapshot by delegating to each
/// subsystem's [`StateComponent`] impl, writing tags in
/// [`STATE_TAG_ORDER`]. Missing trailing sections on load are treated as
/// "leave that subsystem as-is" rather than a hard failure, since a save
/// produced by an older build may simply lack a newer subsystem's tag.
pub struct StateManager;

impl StateManager {
    /// Serializes every component's state into one tagged buffer, in
    /// [`STATE_TAG_ORDER`].
    #[allow(clippy::too_many_arguments)]
    pub fn save(
        cpu: &dyn StateComponent,
        bus: &dyn StateComponent,
        ppu: &dyn StateComponent,
        apu: &dyn StateComponent,
        timer: &dyn StateComponent,
        format: Option<StateFormat>,
    ) -> Result<Vec<u8>, Error> {
        let mut cursor = Cursor::new(vec![]);
        write_to_save(&mut cursor, StateTag::Cpu, &cpu.state(format)?)?;
        write_to_save(&mut cursor, StateTag::Bus, &bus.state(format)?)?;
        write_to_save(&mut cursor, StateTag::Ppu, &ppu.state(format)?)?;
        write_to_save(&mut cursor, StateTag::Apu, &apu.state(format)?)?;
        write_to_save(&mut cursor, StateTag::Timer, &timer.state(format)?)?;
        Ok(cursor.into_inner())
    }

    /// Restores every component from a tagged buffer produced by
    /// [`StateManager::save`]. Sections are applied as they are found;
    /// a buffer that ends early simply leaves the remaining components
    /// untouched, and an unrecognized tag is a hard error since it
    /// signals a corrupt or foreign buffer rather than an older one.
    #[allow(clippy::too_many_arguments)]
    pub fn load(
        data: &[u8],
        cpu: &mut dyn StateComponent,
        bus: &mut dyn StateComponent,
        ppu: &mut dyn StateComponent,
        apu: &mut dyn StateComponent,
        timer: &mut dyn StateComponent,
        format: Option<StateFormat>,
    ) -> Result<(), Error> {
        let mut cursor = Cursor::new(data);
        while (cursor.position() as usize) < data.len() {
            let (tag, section) = match read_from_save(&mut cursor) {
                Ok(result) => result,
                Err(_) => break,
            };
            match tag {
                StateTag::Cpu => cpu.set_state(&section, format)?,
                StateTag::Bus => bus.set_state(&section, format)?,
                StateTag::Ppu => ppu.set_state(&section, format)?,
                StateTag::Apu => apu.set_state(&section, format)?,
                StateTag::Timer => timer.set_state(&section, format)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter(u32);

    impl StateComponent for Counter {
        fn state(&self, _format: Option<StateFormat>) -> Result<Vec<u8>, Error> {
            Ok(self.0.to_le_bytes().to_vec())
        }

        fn set_state(&mut self, data: &[u8], _format: Option<StateFormat>) -> Result<(), Error> {
            self.0 = u32::from_le_bytes(data.try_into().map_err(|_| Error::SaveFormat)?);
            Ok(())
        }
    }

    #[test]
    fn test_round_trip_all_sections() {
        let cpu = Counter(1);
        let bus = Counter(2);
        let ppu = Counter(3);
        let apu = Counter(4);
        let timer = Counter(5);
        let saved = StateManager::save(&cpu, &bus, &ppu, &apu, &timer, None).unwrap();

        let mut cpu2 = Counter(0);
        let mut bus2 = Counter(0);
        let mut ppu2 = Counter(0);
        let mut apu2 = Counter(0);
        let mut timer2 = Counter(0);
        StateManager::load(
            &saved, &mut cpu2, &mut bus2, &mut ppu2, &mut apu2, &mut timer2, None,
        )
        .unwrap();

        assert_eq!(cpu2.0, 1);
        assert_eq!(bus2.0, 2);
        assert_eq!(ppu2.0, 3);
        assert_eq!(apu2.0, 4);
        assert_eq!(timer2.0, 5);
    }

    #[test]
    fn test_truncated_buffer_leaves_remainder_untouched() {
        let cpu = Counter(9);
        let full = StateManager::save(&cpu, &Counter(0), &Counter(0), &Counter(0), &Counter(0), None).unwrap();
        let truncated = &full[..full.len() / 5];

        let mut cpu2 = Counter(0);
        let mut bus2 = Counter(111);
        let mut ppu2 = Counter(222);
        let mut apu2 = Counter(333);
        let mut timer2 = Counter(444);
        StateManager::load(
            truncated, &mut cpu2, &mut bus2, &mut ppu2, &mut apu2, &mut timer2, None,
        )
        .unwrap();

        assert_eq!(cpu2.0, 9);
        assert_eq!(bus2.0, 111);
        assert_eq!(ppu2.0, 222);
        assert_eq!(apu2.0, 333);
        assert_eq!(timer2.0, 444);
    }
}
