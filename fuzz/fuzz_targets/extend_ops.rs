#![no_main]
use libfuzzer_sys::fuzz_target;
use obwt::OnlineRlbwt;

const EM: u8 = 1;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() || data.len() > 512 {
        return;
    }

    // Fold the raw bytes into a small alphabet with occasional markers.
    let input: Vec<u8> = data
        .iter()
        .map(|&b| if b % 11 == 0 { EM } else { b'a' + b % 5 })
        .collect();

    let mut exact = OnlineRlbwt::new(EM);
    let mut sap = OnlineRlbwt::new(EM);
    for &ch in &input {
        exact.extend(ch);
        sap.sap_extend(ch);
    }
    exact.check_integrity();
    sap.check_integrity();

    assert_eq!(exact.len_with_endmarker(), input.len() as u64 + 1);
    assert!(sap.num_runs() <= exact.num_runs());

    let mut recovered = Vec::new();
    exact.invert(&mut recovered).unwrap();
    assert_eq!(recovered, input, "inversion must reproduce the input");
});
