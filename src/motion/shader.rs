// Motion mask shader generation
//
// Cameras with `[cameras.shader]` parameters get their own libplacebo hook:
// luma, separable gaussian blur, then a thresholded difference against the
// previous blurred frame kept in a storage texture. The file name encodes
// every parameter, so an existing file is reused as-is.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::config::ShaderParams;

/// File name for a shader with these parameters
pub fn shader_file_name(params: &ShaderParams, width: u32, height: u32) -> String {
    format!(
        "motion_s{:.2}_r{}_t{:.4}_{}x{}.glsl",
        params.sigma, params.radius, params.motion_threshold, width, height
    )
}

/// Write the shader for `params` into `dir` unless it already exists, and
/// return its path.
///
/// Workers with identical parameters may generate the same file at once.
/// Each call writes its own temporary file and renames it into place, so the
/// shader path only ever holds a complete shader.
pub fn generate_motion_shader(
    params: &ShaderParams,
    width: u32,
    height: u32,
    dir: &Path,
) -> io::Result<PathBuf> {
    let path = dir.join(shader_file_name(params, width, height));
    if path.exists() {
        log::debug!("Reusing shader {}", path.display());
        return Ok(path);
    }

    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".motion_")
        .suffix(".glsl.tmp")
        .tempfile_in(dir)?;
    tmp.write_all(render_shader(params, width, height).as_bytes())?;
    tmp.as_file().sync_all()?;
    if let Err(e) = tmp.persist(&path) {
        // A rename that lost to an identical shader still leaves a usable file
        if !path.exists() {
            return Err(e.into());
        }
    }

    log::info!("Generated shader {}", path.display());
    Ok(path)
}

/// GLSL source of the motion hook
pub fn render_shader(params: &ShaderParams, width: u32, height: u32) -> String {
    format!(
        "//!HOOK MAIN
//!BIND HOOKED
//!BIND PREV
//!DESC motion mask (luma, blur, frame difference)

// generated: sigma={sigma:.3} radius={radius} threshold={threshold:.6} size={width}x{height}

#define SIGMA {sigma:.6}
#define RADIUS {radius}.0
#define MOTION_THRESHOLD {threshold:.6}

{body}
//!TEXTURE PREV
//!SIZE {width} {height} 1
//!FORMAT r8
//!STORAGE
",
        sigma = params.sigma,
        radius = params.radius,
        threshold = params.motion_threshold,
        body = HOOK_BODY,
    )
}

const HOOK_BODY: &str = r#"#define gauss(x) (exp(-(x) * (x) / (2.0 * SIGMA * SIGMA)))

vec4 hook() {
    vec4 px = linearize(textureLod(HOOKED_raw, HOOKED_pos, 0.0) * HOOKED_mul);
    float luma = dot(px.rgb, vec3(0.2126, 0.7152, 0.0722));

    vec4 acc = vec4(luma, luma, luma, 0.0);
    float norm = 1.0;
    for (float i = 1.0; i <= RADIUS; ++i) {
        float w = gauss(i);
        acc += (textureLod(HOOKED_raw, HOOKED_pos + vec2(0.0, -i) / HOOKED_size.xy, 0.0)
              + textureLod(HOOKED_raw, HOOKED_pos + vec2(0.0,  i) / HOOKED_size.xy, 0.0)) * w;
        norm += 2.0 * w;
    }
    vec4 vert = acc / norm;

    acc = vert;
    norm = 1.0;
    for (float i = 1.0; i <= RADIUS; ++i) {
        float w = gauss(i);
        acc += (textureLod(HOOKED_raw, HOOKED_pos + vec2(-i, 0.0) / HOOKED_size.xy, 0.0)
              + textureLod(HOOKED_raw, HOOKED_pos + vec2( i, 0.0) / HOOKED_size.xy, 0.0)) * w;
        norm += 2.0 * w;
    }
    vec4 blurred = acc / norm;

    ivec3 pos = ivec3(HOOKED_pos * HOOKED_size, 0);
    vec4 prev = imageLoad(PREV, pos);
    float moved = abs(blurred.r - prev.r) > MOTION_THRESHOLD ? 1.0 : 0.0;
    imageStore(PREV, pos, blurred);

    return vec4(moved);
}
"#;
