//! Multi-level pointer chain reader and the fixed Rocksmith 2014 layout
//!
//! The game is a 32-bit process, so every pointer along the chain is a 4-byte
//! value. A null pointer anywhere before the last hop means "no data right
//! now" (no song loaded, menus, loading screens) and is reported as `None`,
//! exactly like a failed read. The final hop is data, so zero is a valid
//! result there.

use tracing::trace;

use crate::process::{Address, MemoryReader};

/// Offset-then-dereference path from a module base to a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerChain {
    /// Offset from the module base to the first pointer
    pub base_offset: Address,
    /// Offsets applied after each dereference; the last one addresses the value
    pub offsets: &'static [Address],
}

/// What the poller attaches to and how it finds the tone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    /// Name used in status messages
    pub display_name: &'static str,
    /// Executable name the process locator matches
    pub process_name: &'static str,
    /// Module whose base anchors the chain
    pub module_name: &'static str,
    pub chain: PointerChain,
}

/// Rocksmith 2014 Remastered (PC, current Steam build)
pub const ROCKSMITH_2014: Target = Target {
    display_name: "Rocksmith 2014",
    process_name: "Rocksmith2014.exe",
    module_name: "Rocksmith2014.exe",
    chain: PointerChain {
        base_offset: 0x00F5_F54C,
        offsets: &[0x10, 0x28, 0x38, 0x18, 0x04, 0xBC, 0x10],
    },
};

/// Follow `chain` from `module_base` and read the value at its end.
///
/// Returns `None` for a null base or intermediate pointer, for any failed
/// read, and for a chain without offsets.
pub fn read_chain<M>(memory: &M, module_base: Address, chain: &PointerChain) -> Option<i32>
where
    M: MemoryReader + ?Sized,
{
    let (last, hops) = chain.offsets.split_last()?;

    let mut pointer = read(memory, module_base.checked_add(chain.base_offset)?)?;
    if pointer == 0 {
        return None;
    }

    for &offset in hops {
        pointer = read(memory, follow(pointer, offset)?)?;
        if pointer == 0 {
            return None;
        }
    }

    read(memory, follow(pointer, *last)?)
}

/// Address `offset` bytes past a 32-bit pointer value
fn follow(pointer: i32, offset: Address) -> Option<Address> {
    (pointer as u32 as Address).checked_add(offset)
}

fn read<M: MemoryReader + ?Sized>(memory: &M, address: Address) -> Option<i32> {
    memory
        .read_i32(address)
        .map_err(|e| trace!("pointer chain read failed: {}", e))
        .ok()
}
