//! Runs the bundled `.wast` fixtures through the script runner.

macro_rules! run_wast {
    ($name:ident) => {
        #[test]
        fn $name() {
            let source = include_str!(concat!("spec/", stringify!($name), ".wast"));
            let summary = wasmith::run_script(source)
                .unwrap_or_else(|error| panic!("{}.wast failed: {}", stringify!($name), error));
            assert!(summary.commands > 0);
        }
    };
}

run_wast!(block);
run_wast!(br);
run_wast!(br_table);
run_wast!(call);
run_wast!(const_literals);
run_wast!(endianness);
run_wast!(exhaustion);
run_wast!(float_ops);
run_wast!(globals);
run_wast!(int_exprs);
run_wast!(malformed);
run_wast!(memory_ops);
run_wast!(traps);
