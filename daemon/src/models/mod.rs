macro_rules! import_models {
    ($x:ident) => {
        mod $x;
        pub use self::$x::*;
    };
}

import_models!(build);
import_models!(build_result);
import_models!(package);
import_models!(tenant);
