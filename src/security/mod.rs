pub mod file_access;

pub use file_access::{
    add_file_access_controller, to_matcher, FileAccessController, FileAccessOptions,
    SegmentMap, FILEACCESS_SEGMENT,
};
