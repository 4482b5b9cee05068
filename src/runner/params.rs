use std::ffi::OsString;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// 识别算法的可选调参，未设置的项不传给外部程序，由外部程序决定默认值
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessParameters {
    pub iterations: Option<u32>,
    pub slope_factor: Option<f64>,
    pub hug_factor: Option<f64>,
    pub seed: Option<i32>,
}

/// 构造外部程序的参数：
/// `[--iterations N] [--slopeFactor F] [--hugFactor F] [--seed N] <input> <output>`
pub fn build_arguments(params: &ProcessParameters, input: &Path, output: &Path) -> Vec<OsString> {
    let mut args = Vec::with_capacity(10);

    let mut flag = |name: &str, value: String| {
        args.push(OsString::from(name));
        args.push(OsString::from(value));
    };
    if let Some(iterations) = params.iterations {
        flag("--iterations", iterations.to_string());
    }
    if let Some(slope_factor) = params.slope_factor {
        flag("--slopeFactor", slope_factor.to_string());
    }
    if let Some(hug_factor) = params.hug_factor {
        flag("--hugFactor", hug_factor.to_string());
    }
    if let Some(seed) = params.seed {
        flag("--seed", seed.to_string());
    }

    args.push(input.as_os_str().to_owned());
    args.push(output.as_os_str().to_owned());
    args
}

/// 仅用于日志的命令行文本，最后两个参数（输入、输出路径）加引号
pub fn command_line(tool: &Path, args: &[OsString]) -> String {
    let quoted_from = args.len().saturating_sub(2);
    let mut line = format!("\"{}\"", tool.display());
    for (i, arg) in args.iter().enumerate() {
        line.push(' ');
        if i >= quoted_from {
            line.push('"');
            line.push_str(&arg.to_string_lossy());
            line.push('"');
        } else {
            line.push_str(&arg.to_string_lossy());
        }
    }
    line
}
