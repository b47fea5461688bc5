mod builder;
mod dex_files;
mod xref;

use crate::tests::builder::*;

pub const MAIN: &str = "LMain;";
pub const INNER: &str = "LMain$Inner;";
pub const HELPER: &str = "Lcom/ext/Helper;";
pub const CLOCK: &str = "Landroid/os/SystemClock;";

/// Two classes calling into each other and into outside classes.
///
/// `LMain;->run()V` byte offsets:
/// 0 const-string, 4 new-instance, 8 invoke-direct, 14 invoke-virtual,
/// 20 sget, 24 sput, 28/34/40 invoke-static, 46 const-class, 50 return-void.
pub fn sample_app() -> DexBuilder {
    let init = Code::new(
        1,
        vec![Unit::Raw(0x1070), method("Ljava/lang/Object;", "<init>", "()V"), Unit::Raw(0), Unit::Raw(0x000e)],
    );
    let mut run_units = vec![Unit::Raw(0x001a), string("hello"), Unit::Raw(0x0122), ty(HELPER)];
    run_units.extend([Unit::Raw(0x1070), method(HELPER, "<init>", "()V"), Unit::Raw(0x0001)]);
    run_units.extend([Unit::Raw(0x206e), method(HELPER, "greet", "(Ljava/lang/String;)V"), Unit::Raw(0x0001)]);
    run_units.extend([Unit::Raw(0x0060), field(MAIN, "count", "I")]);
    run_units.extend([Unit::Raw(0x0067), field(MAIN, "count", "I")]);
    run_units.extend([Unit::Raw(0x0071), method(CLOCK, "uptimeMillis", "()J"), Unit::Raw(0)]);
    run_units.extend([Unit::Raw(0x0071), method(MAIN, "helper", "()V"), Unit::Raw(0)]);
    run_units.extend([Unit::Raw(0x0071), method(MAIN, "helper", "()V"), Unit::Raw(0)]);
    run_units.extend([Unit::Raw(0x001c), ty("Ljava/lang/String;")]);
    run_units.push(Unit::Raw(0x000e));

    let helper = Code::new(2, vec![Unit::Raw(0x1054), field(MAIN, "name", "Ljava/lang/String;"), Unit::Raw(0x000e)]);
    let go = Code::new(1, vec![Unit::Raw(0x106e), method(MAIN, "run", "()V"), Unit::Raw(0), Unit::Raw(0x000e)]);

    DexBuilder::new()
        .class(
            ClassSpec::new(MAIN)
                .implements("Ljava/lang/Runnable;")
                .source("Main.java")
                .field("count", "I", ACC_STATIC)
                .field("name", "Ljava/lang/String;", ACC_PRIVATE)
                .method("<init>", "()V", ACC_PUBLIC | ACC_CONSTRUCTOR, Some(init))
                .method("run", "()V", ACC_PUBLIC, Some(Code::new(2, run_units)))
                .method("helper", "()V", ACC_STATIC, Some(helper))
                .method("nativeStuff", "(IJ)V", ACC_PUBLIC | ACC_NATIVE, None),
        )
        .class(ClassSpec::new(INNER).extends(Some(MAIN)).method("go", "()V", ACC_PUBLIC, Some(go)))
        .string("unused")
}
