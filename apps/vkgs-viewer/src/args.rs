//! Command line parsing.

use anyhow::{anyhow, bail, Context};

/// Which splats to show.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SceneChoice {
    /// The small fixed test scene.
    Test,
    /// `count` random splats inside a cube of half-size `extent`.
    Random { count: usize, seed: u64, extent: f32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Args {
    pub scene: SceneChoice,
    pub scale_modifier: f32,
    pub width: u32,
    pub height: u32,
    pub vsync: bool,
    pub validation: Option<bool>,
    pub speed: Option<f32>,
    pub help: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            scene: SceneChoice::Test,
            scale_modifier: 1.0,
            width: 1280,
            height: 720,
            vsync: true,
            validation: None,
            speed: None,
            help: false,
        }
    }
}

fn value<'a>(flag: &str, iter: &mut impl Iterator<Item = &'a str>) -> anyhow::Result<&'a str> {
    iter.next().ok_or_else(|| anyhow!("{flag} needs a value"))
}

fn parse<T: std::str::FromStr>(flag: &str, raw: &str) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse()
        .with_context(|| format!("invalid value {raw:?} for {flag}"))
}

impl Args {
    pub fn parse<'a>(args: impl IntoIterator<Item = &'a str>) -> anyhow::Result<Self> {
        let mut parsed = Self::default();
        let mut count = None;
        let mut seed = 42;
        let mut extent = 3.0;

        let mut iter = args.into_iter();
        while let Some(arg) = iter.next() {
            match arg {
                "-h" | "--help" => parsed.help = true,
                "-n" | "--splats" => count = Some(parse(arg, value(arg, &mut iter)?)?),
                "--seed" => seed = parse(arg, value(arg, &mut iter)?)?,
                "--extent" => extent = parse(arg, value(arg, &mut iter)?)?,
                "--scale" => parsed.scale_modifier = parse(arg, value(arg, &mut iter)?)?,
                "--width" => parsed.width = parse(arg, value(arg, &mut iter)?)?,
                "--height" => parsed.height = parse(arg, value(arg, &mut iter)?)?,
                "--speed" => parsed.speed = Some(parse(arg, value(arg, &mut iter)?)?),
                "--no-vsync" => parsed.vsync = false,
                "--validation" => parsed.validation = Some(true),
                "--no-validation" => parsed.validation = Some(false),
                other => bail!("unknown argument {other:?} (see --help)"),
            }
        }

        if let Some(count) = count {
            parsed.scene = SceneChoice::Random {
                count,
                seed,
                extent,
            };
        }
        if parsed.width == 0 || parsed.height == 0 {
            bail!("window size {}x{} has no area", parsed.width, parsed.height);
        }
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_test_scene() {
        let args = Args::parse([]).unwrap();
        assert_eq!(args, Args::default());
    }

    #[test]
    fn splat_count_selects_random_scene() {
        let args = Args::parse(["--seed", "7", "-n", "5000", "--no-vsync"]).unwrap();
        assert_eq!(
            args.scene,
            SceneChoice::Random {
                count: 5000,
                seed: 7,
                extent: 3.0
            }
        );
        assert!(!args.vsync);
    }

    #[test]
    fn bad_input_is_reported() {
        assert!(Args::parse(["--splats"]).is_err());
        assert!(Args::parse(["--width", "wide"]).is_err());
        assert!(Args::parse(["--bogus"]).is_err());
        assert!(Args::parse(["--width", "0"]).is_err());
    }
}
