//! Static tables describing the Python builtins.
//!
//! Names follow CPython 3.10 through 3.12; a name missing here is treated as
//! undefined, so the tables err on the side of including too much.

use phf::{phf_map, phf_set};

use crate::analysis::ValueType;

/// Names available in every module without an import.
pub static BUILTIN_NAMES: phf::Set<&'static str> = phf_set! {
    // functions and types
    "abs", "aiter", "all", "anext", "any", "ascii", "bin", "bool", "breakpoint",
    "bytearray", "bytes", "callable", "chr", "classmethod", "compile", "complex",
    "copyright", "credits", "delattr", "dict", "dir", "divmod", "enumerate", "eval",
    "exec", "exit", "filter", "float", "format", "frozenset", "getattr", "globals",
    "hasattr", "hash", "help", "hex", "id", "input", "int", "isinstance",
    "issubclass", "iter", "len", "license", "list", "locals", "map", "max",
    "memoryview", "min", "next", "object", "oct", "open", "ord", "pow", "print",
    "property", "quit", "range", "repr", "reversed", "round", "set", "setattr",
    "slice", "sorted", "staticmethod", "str", "sum", "super", "tuple", "type",
    "vars", "zip", "__import__",
    // constants and module attributes
    "True", "False", "None", "NotImplemented", "Ellipsis", "__name__", "__file__",
    "__doc__", "__builtins__", "__spec__", "__loader__", "__package__", "__debug__",
    "__annotations__", "__class__", "__dict__",
    // exceptions and warnings
    "BaseException", "BaseExceptionGroup", "Exception", "ExceptionGroup",
    "ArithmeticError", "AssertionError", "AttributeError", "BlockingIOError",
    "BrokenPipeError", "BufferError", "BytesWarning", "ChildProcessError",
    "ConnectionAbortedError", "ConnectionError", "ConnectionRefusedError",
    "ConnectionResetError", "DeprecationWarning", "EOFError", "EncodingWarning",
    "EnvironmentError", "FileExistsError", "FileNotFoundError", "FloatingPointError",
    "FutureWarning", "GeneratorExit", "IOError", "ImportError", "ImportWarning",
    "IndentationError", "IndexError", "InterruptedError", "IsADirectoryError",
    "KeyError", "KeyboardInterrupt", "LookupError", "MemoryError",
    "ModuleNotFoundError", "NameError", "NotADirectoryError", "NotImplementedError",
    "OSError", "OverflowError", "PendingDeprecationWarning", "PermissionError",
    "ProcessLookupError", "RecursionError", "ReferenceError", "ResourceWarning",
    "RuntimeError", "RuntimeWarning", "StopAsyncIteration", "StopIteration",
    "SyntaxError", "SyntaxWarning", "SystemError", "SystemExit", "TabError",
    "TimeoutError", "TypeError", "UnboundLocalError", "UnicodeDecodeError",
    "UnicodeEncodeError", "UnicodeError", "UnicodeTranslateError", "UnicodeWarning",
    "UserWarning", "ValueError", "Warning", "ZeroDivisionError",
};

static STR_ATTRS: phf::Set<&'static str> = phf_set! {
    "capitalize", "casefold", "center", "count", "encode", "endswith", "expandtabs",
    "find", "format", "format_map", "index", "isalnum", "isalpha", "isascii",
    "isdecimal", "isdigit", "isidentifier", "islower", "isnumeric", "isprintable",
    "isspace", "istitle", "isupper", "join", "ljust", "lower", "lstrip", "maketrans",
    "partition", "removeprefix", "removesuffix", "replace", "rfind", "rindex",
    "rjust", "rpartition", "rsplit", "rstrip", "split", "splitlines", "startswith",
    "strip", "swapcase", "title", "translate", "upper", "zfill",
};

static LIST_ATTRS: phf::Set<&'static str> = phf_set! {
    "append", "clear", "copy", "count", "extend", "index", "insert", "pop",
    "remove", "reverse", "sort",
};

static DICT_ATTRS: phf::Set<&'static str> = phf_set! {
    "clear", "copy", "fromkeys", "get", "items", "keys", "pop", "popitem",
    "setdefault", "update", "values",
};

static SET_ATTRS: phf::Set<&'static str> = phf_set! {
    "add", "clear", "copy", "difference", "difference_update", "discard",
    "intersection", "intersection_update", "isdisjoint", "issubset", "issuperset",
    "pop", "remove", "symmetric_difference", "symmetric_difference_update", "union",
    "update",
};

static TUPLE_ATTRS: phf::Set<&'static str> = phf_set! {
    "count", "index",
};

static INT_ATTRS: phf::Set<&'static str> = phf_set! {
    "as_integer_ratio", "bit_count", "bit_length", "conjugate", "denominator",
    "from_bytes", "imag", "is_integer", "numerator", "real", "to_bytes",
};

static FLOAT_ATTRS: phf::Set<&'static str> = phf_set! {
    "as_integer_ratio", "conjugate", "fromhex", "hex", "imag", "is_integer", "real",
};

/// `math` functions whose every argument must be a real number. Functions
/// taking iterables (`fsum`, `prod`, `dist`, `sumprod`) are left out.
pub static MATH_SCALAR_FUNCTIONS: phf::Set<&'static str> = phf_set! {
    "acos", "acosh", "asin", "asinh", "atan", "atan2", "atanh", "cbrt", "ceil",
    "comb", "copysign", "cos", "cosh", "degrees", "erf", "erfc", "exp", "exp2",
    "expm1", "fabs", "factorial", "floor", "fmod", "frexp", "gamma", "gcd",
    "hypot", "isclose", "isfinite", "isinf", "isnan", "isqrt", "lcm", "ldexp",
    "lgamma", "log", "log10", "log1p", "log2", "modf", "nextafter", "perm",
    "pow", "radians", "remainder", "sin", "sinh", "sqrt", "tan", "tanh",
    "trunc", "ulp",
};

/// Attributes a value of a builtin type has, `None` when the type is not
/// tracked precisely enough to judge.
pub fn attributes_of(value_type: ValueType) -> Option<&'static phf::Set<&'static str>> {
    match value_type {
        ValueType::Str => Some(&STR_ATTRS),
        ValueType::List => Some(&LIST_ATTRS),
        ValueType::Dict => Some(&DICT_ATTRS),
        ValueType::Set => Some(&SET_ATTRS),
        ValueType::Tuple => Some(&TUPLE_ATTRS),
        ValueType::Int | ValueType::Bool => Some(&INT_ATTRS),
        ValueType::Float => Some(&FLOAT_ATTRS),
        ValueType::NoneType | ValueType::Unknown => None,
    }
}

/// Attribute names borrowed from other languages, with the Python spelling.
pub static ATTRIBUTE_SUGGESTIONS: phf::Map<&'static str, &'static str> = phf_map! {
    "push" => "append",
    "length" => "len()",
    "size" => "len()",
    "len" => "len()",
    "add" => "append",
    "contains" => "the `in` operator",
    "includes" => "the `in` operator",
    "has_key" => "the `in` operator",
    "toUpperCase" => "upper",
    "toLowerCase" => "lower",
    "toupper" => "upper",
    "tolower" => "lower",
    "trim" => "strip",
    "indexOf" => "index",
    "charAt" => "indexing",
    "forEach" => "a for loop",
    "each" => "a for loop",
    "map" => "a comprehension",
    "filter" => "a comprehension",
    "substring" => "slicing",
    "substr" => "slicing",
    "lenght" => "len()",
    "sortBy" => "sort(key=...)",
    "reversed" => "reverse",
    "startsWith" => "startswith",
    "endsWith" => "endswith",
    "isEmpty" => "not x",
    "keySet" => "keys",
    "put" => "item assignment",
    "remove_at" => "pop",
};

static MATH_MEMBERS: phf::Set<&'static str> = phf_set! {
    "acos", "acosh", "asin", "asinh", "atan", "atan2", "atanh", "cbrt", "ceil",
    "comb", "copysign", "cos", "cosh", "degrees", "dist", "e", "erf", "erfc", "exp",
    "exp2", "expm1", "fabs", "factorial", "floor", "fmod", "frexp", "fsum", "gamma",
    "gcd", "hypot", "inf", "isclose", "isfinite", "isinf", "isnan", "isqrt", "lcm",
    "ldexp", "lgamma", "log", "log10", "log1p", "log2", "modf", "nan", "nextafter",
    "perm", "pi", "pow", "prod", "radians", "remainder", "sin", "sinh", "sqrt",
    "sumprod", "tan", "tanh", "tau", "trunc", "ulp",
};

static RANDOM_MEMBERS: phf::Set<&'static str> = phf_set! {
    "betavariate", "binomialvariate", "choice", "choices", "expovariate",
    "gammavariate", "gauss", "getrandbits", "getstate", "lognormvariate",
    "normalvariate", "paretovariate", "randbytes", "randint", "random", "randrange",
    "sample", "seed", "setstate", "shuffle", "triangular", "uniform",
    "vonmisesvariate", "weibullvariate", "Random", "SystemRandom",
};

static JSON_MEMBERS: phf::Set<&'static str> = phf_set! {
    "dump", "dumps", "load", "loads", "JSONDecoder", "JSONDecodeError",
    "JSONEncoder", "decoder", "encoder", "scanner", "tool",
};

static STRING_MEMBERS: phf::Set<&'static str> = phf_set! {
    "ascii_letters", "ascii_lowercase", "ascii_uppercase", "capwords", "digits",
    "hexdigits", "octdigits", "printable", "punctuation", "whitespace",
    "Formatter", "Template",
};

static TIME_MEMBERS: phf::Set<&'static str> = phf_set! {
    "altzone", "asctime", "clock_getres", "clock_gettime", "clock_gettime_ns",
    "clock_settime", "clock_settime_ns", "ctime", "daylight", "get_clock_info",
    "gmtime", "localtime", "mktime", "monotonic", "monotonic_ns", "perf_counter",
    "perf_counter_ns", "process_time", "process_time_ns", "sleep", "strftime",
    "strptime", "struct_time", "thread_time", "thread_time_ns", "time", "time_ns",
    "timezone", "tzname", "tzset", "CLOCK_MONOTONIC", "CLOCK_REALTIME",
    "CLOCK_PROCESS_CPUTIME_ID", "CLOCK_THREAD_CPUTIME_ID",
};

static OS_PATH_MEMBERS: phf::Set<&'static str> = phf_set! {
    "abspath", "altsep", "basename", "commonpath", "commonprefix", "curdir",
    "defpath", "devnull", "dirname", "exists", "expanduser", "expandvars", "extsep",
    "getatime", "getctime", "getmtime", "getsize", "isabs", "isdir", "isfile",
    "isjunction", "islink", "ismount", "join", "lexists", "normcase", "normpath",
    "pardir", "pathsep", "realpath", "relpath", "samefile", "sameopenfile",
    "samestat", "sep", "split", "splitdrive", "splitext", "splitroot",
    "supports_unicode_filenames",
};

static STATISTICS_MEMBERS: phf::Set<&'static str> = phf_set! {
    "correlation", "covariance", "fmean", "geometric_mean", "harmonic_mean",
    "linear_regression", "mean", "median", "median_grouped", "median_high",
    "median_low", "mode", "multimode", "pstdev", "pvariance", "quantiles", "stdev",
    "variance", "NormalDist", "StatisticsError",
};

/// Complete member list of a stdlib module, for the modules tracked closely.
pub fn module_members(module: &str) -> Option<&'static phf::Set<&'static str>> {
    match module {
        "math" => Some(&MATH_MEMBERS),
        "random" => Some(&RANDOM_MEMBERS),
        "json" => Some(&JSON_MEMBERS),
        "string" => Some(&STRING_MEMBERS),
        "time" => Some(&TIME_MEMBERS),
        "os.path" | "posixpath" => Some(&OS_PATH_MEMBERS),
        "statistics" => Some(&STATISTICS_MEMBERS),
        _ => None,
    }
}

/// Whether `member` exists on `module`. Unknown modules accept everything.
pub fn module_has_member(module: &str, member: &str) -> bool {
    if member.starts_with("__") {
        return true;
    }
    module_members(module).map_or(true, |members| members.contains(member))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_names() {
        assert!(BUILTIN_NAMES.contains("len"));
        assert!(BUILTIN_NAMES.contains("ZeroDivisionError"));
        assert!(BUILTIN_NAMES.contains("__name__"));
        assert!(!BUILTIN_NAMES.contains("sqrt"));
    }

    #[test]
    fn test_type_attributes() {
        let list = attributes_of(ValueType::List).unwrap();
        assert!(list.contains("append"));
        assert!(!list.contains("push"));
        assert!(attributes_of(ValueType::Str).unwrap().contains("upper"));
        assert!(attributes_of(ValueType::Unknown).is_none());
        assert!(attributes_of(ValueType::NoneType).is_none());
        assert_eq!(ATTRIBUTE_SUGGESTIONS.get("push"), Some(&"append"));
    }

    #[test]
    fn test_module_members() {
        assert!(module_has_member("math", "sqrt"));
        assert!(!module_has_member("math", "sqroot"));
        assert!(module_has_member("os.path", "join"));
        assert!(module_has_member("math", "__doc__"));
        assert!(module_has_member("numpy", "anything"));
    }
}
