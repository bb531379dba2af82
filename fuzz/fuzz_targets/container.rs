#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(container) = dexsplit::DexContainer::parse(data) {
        let _ = dexsplit::dex2c::split(
            &container,
            &dexsplit::dex2c::BasicFilter,
            &dexsplit::dex2c::NativeStubConverter,
        );
    }
});
