use std::ffi::{c_int, CStr, CString};
use std::ptr::null_mut;

use ffmpeg_next::ffi;
use log::warn;

use crate::camera::{EngineError, OptionDictionary};

/// Owned `AVDictionary`, filled from and read back into an
/// [`OptionDictionary`]. FFmpeg removes the entries it consumes.
pub(crate) struct RawDictionary {
    ptr: *mut ffi::AVDictionary,
}

impl RawDictionary {
    pub(crate) fn from_options(options: &OptionDictionary) -> Result<Self, EngineError> {
        let mut dictionary = Self { ptr: null_mut() };
        for (key, value) in options.iter() {
            let c_key = CString::new(key).map_err(|_| {
                EngineError::configuration(format!("option name {:?} contains a NUL byte", key))
            })?;
            let c_value = CString::new(value).map_err(|_| {
                EngineError::configuration(format!("option {} contains a NUL byte", key))
            })?;
            let ret = unsafe {
                ffi::av_dict_set(&mut dictionary.ptr, c_key.as_ptr(), c_value.as_ptr(), 0)
            };
            if ret < 0 {
                warn!("Could not set option {}={}", key, value);
            }
        }
        Ok(dictionary)
    }

    pub(crate) fn as_mut_ptr(&mut self) -> *mut *mut ffi::AVDictionary {
        &mut self.ptr
    }

    /// Entries FFmpeg left untouched.
    pub(crate) fn remaining(&self) -> OptionDictionary {
        let mut options = OptionDictionary::new();
        let mut entry: *mut ffi::AVDictionaryEntry = null_mut();
        let empty = c"";
        loop {
            entry = unsafe {
                ffi::av_dict_get(
                    self.ptr,
                    empty.as_ptr(),
                    entry,
                    ffi::AV_DICT_IGNORE_SUFFIX as c_int,
                )
            };
            if entry.is_null() {
                break;
            }
            let (key, value) = unsafe {
                (
                    CStr::from_ptr((*entry).key).to_string_lossy().into_owned(),
                    if (*entry).value.is_null() {
                        String::new()
                    } else {
                        CStr::from_ptr((*entry).value).to_string_lossy().into_owned()
                    },
                )
            };
            options.set(key, value);
        }
        options
    }
}

impl Drop for RawDictionary {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe { ffi::av_dict_free(&mut self.ptr) };
        }
    }
}
