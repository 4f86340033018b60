/// How ROM offsets map onto the SNES address space.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Mapping {
	/// `.lowrom`: 32K banks at $00:8000
	LowRom,
	/// `.lowrom2`: 32K banks at $80:8000
	LowRomFast,
	/// `.highrom`: 64K banks at $C0:0000
	#[default]
	HighRom,
}

/// SNES address to ROM offset.
pub fn snes_to_rom(addr: u32) -> u32 {
	if addr >= 0xC0_0000 {
		addr - 0xC0_0000
	} else if addr >= 0x80_8000 {
		let bank = (addr >> 16) - 0x80;
		bank * 0x8000 + (addr & 0x7FFF)
	} else {
		let bank = addr >> 16;
		bank * 0x8000 + (addr & 0x7FFF)
	}
}

/// ROM offset to SNES address under `mapping`.
pub fn rom_to_snes(addr: u32, mapping: Mapping) -> u32 {
	match mapping {
		Mapping::LowRom => (addr / 0x8000) << 16 | ((addr % 0x8000) + 0x8000),
		Mapping::LowRomFast => (addr / 0x8000 + 0x80) << 16 | ((addr % 0x8000) + 0x8000),
		Mapping::HighRom => addr.wrapping_add(0xC0_0000),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn highrom_round_trips() {
		assert_eq!(snes_to_rom(0xC0_8000), 0x8000);
		assert_eq!(rom_to_snes(0x8000, Mapping::HighRom), 0xC0_8000);
	}

	#[test]
	fn lowrom_banks_are_32k() {
		assert_eq!(snes_to_rom(0x01_8000), 0x8000);
		assert_eq!(snes_to_rom(0x81_9234), 0x9234);
		assert_eq!(rom_to_snes(0x8000, Mapping::LowRom), 0x01_8000);
		assert_eq!(rom_to_snes(0x1234, Mapping::LowRomFast), 0x80_9234);
	}
}
