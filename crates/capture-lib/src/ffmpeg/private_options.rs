use std::ffi::CStr;
use std::fmt;

use ffmpeg_next::ffi;
use log::{debug, log_enabled, Level};

use crate::camera::OptionDictionary;

pub enum OptionValue {
    Int { default: i64 },
    Flags { default: i64 },
    String { default: String },
    Other,
}

impl fmt::Debug for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Int { default } => write!(f, "int, default {}", default),
            OptionValue::Flags { default } => write!(f, "flags, default 0b{:b}", default),
            OptionValue::String { default } => write!(f, "string, default \"{}\"", default),
            OptionValue::Other => write!(f, "other"),
        }
    }
}

pub struct CodecOption {
    pub name: String,
    pub help: String,
    pub value: OptionValue,
}

/// Options a decoder accepts beyond the generic codec ones.
pub struct CodecPrivateOptions {
    pub codec_name: String,
    pub options: Vec<CodecOption>,
}

impl CodecPrivateOptions {
    pub fn find(&self, name: &str) -> Option<&CodecOption> {
        self.options.iter().find(|o| o.name == name)
    }
}

impl fmt::Debug for CodecPrivateOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} private options ({}):", self.codec_name, self.options.len())?;
        for option in &self.options {
            writeln!(f, "  {} ({:?}): {}", option.name, option.value, option.help)?;
        }
        Ok(())
    }
}

pub fn codec_private_options(codec: &ffmpeg_next::Codec) -> CodecPrivateOptions {
    let mut options = Vec::new();

    unsafe {
        let class = (*codec.as_ptr()).priv_class;
        if !class.is_null() {
            let mut opt = std::ptr::null();
            loop {
                opt = ffi::av_opt_next(&class as *const _ as *const _, opt);
                if opt.is_null() {
                    break;
                }
                // Named constants belong to the option before them.
                if (*opt).type_ == ffi::AVOptionType::AV_OPT_TYPE_CONST {
                    continue;
                }

                let name = CStr::from_ptr((*opt).name).to_string_lossy().into_owned();
                let help = if (*opt).help.is_null() {
                    String::new()
                } else {
                    CStr::from_ptr((*opt).help).to_string_lossy().into_owned()
                };
                let value = match (*opt).type_ {
                    ffi::AVOptionType::AV_OPT_TYPE_INT | ffi::AVOptionType::AV_OPT_TYPE_INT64 => {
                        OptionValue::Int {
                            default: (*opt).default_val.i64_,
                        }
                    }
                    ffi::AVOptionType::AV_OPT_TYPE_FLAGS => OptionValue::Flags {
                        default: (*opt).default_val.i64_,
                    },
                    ffi::AVOptionType::AV_OPT_TYPE_STRING => OptionValue::String {
                        default: if (*opt).default_val.str_.is_null() {
                            String::new()
                        } else {
                            CStr::from_ptr((*opt).default_val.str_)
                                .to_string_lossy()
                                .into_owned()
                        },
                    },
                    _ => OptionValue::Other,
                };
                options.push(CodecOption { name, help, value });
            }
        }
    }

    CodecPrivateOptions {
        codec_name: codec.name().to_string(),
        options,
    }
}

/// Lists what the decoder would have accepted, for options it ignored.
pub(crate) fn log_unconsumed(codec: &ffmpeg_next::Codec, remaining: &OptionDictionary) {
    if remaining.is_empty() || !log_enabled!(Level::Debug) {
        return;
    }
    let private = codec_private_options(codec);
    debug!(
        "{} did not consume: {}",
        private.codec_name,
        remaining.keys().collect::<Vec<_>>().join(", ")
    );
    debug!("{:?}", private);
}
