#![no_main]

use cordyceps_avl::model::JoinSplitInput;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: JoinSplitInput| {
    cordyceps_avl::model::run_join_split(input.keys, input.pivot);
});
