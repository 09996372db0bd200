// Integration-test harness for nova-synth.
//
// Cargo builds one test binary per `tests/*.rs` file; everything lives under `suite/`.

mod suite;
