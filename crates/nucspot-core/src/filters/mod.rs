pub mod log3d;

pub use log3d::laplacian_of_gaussian_3d;
