// kinematics module
pub mod kinematics {
    pub mod lorentz;
    pub mod object;
}

// algorithm module
pub mod algorithm {
    pub mod permutation;
    pub mod likelihood;
    pub mod pairs;
    pub mod matching;
}

// density module
pub mod density {
    pub mod table;
    pub mod registry;
}

pub mod error;

pub use error::{Error, Result};
